use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use super::dataset::Dataset;
use super::model::{metadata_from_json, metadata_to_json, Channel, Metadata, Samples, Trace};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Document layout
// ---------------------------------------------------------------------------
//
// {
//   "title": "...",
//   "traces": [ { "channels": [ {channel_type, excitation_wavelength,
//                  emission_wavelength, exposure_time, data, metadata} ],
//                 "metadata": {} } ],
//   "metadata": {}, "sample_details": {}, "instrument_details": {},
//   "description"?, "experiment_type"?, "authors"?, "institution"?,
//   "date"?: "YYYY-MM-DD"
// }
//
// Channel scalars are always written (null when unset). Optional dataset
// fields are written only when set and non-empty.

const DATE_FORMAT: &str = "%Y-%m-%d";

type JsonMap = Map<String, Value>;

fn required<'a>(map: &'a JsonMap, key: &str, context: &str) -> Result<&'a Value> {
    map.get(key).ok_or_else(|| Error::missing_key(key, context))
}

fn required_array<'a>(map: &'a JsonMap, key: &str, context: &str) -> Result<&'a Vec<Value>> {
    required(map, key, context)?
        .as_array()
        .ok_or_else(|| Error::Format(format!("{context} '{key}' must be an array")))
}

fn object<'a>(val: &'a Value, context: &str) -> Result<&'a JsonMap> {
    val.as_object()
        .ok_or_else(|| Error::Format(format!("{context} must be an object, got {val}")))
}

fn optional_f64(map: &JsonMap, key: &str, context: &str) -> Result<Option<f64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(Error::Format(format!(
            "{context} '{key}' must be a number or null, got {other}"
        ))),
    }
}

fn optional_string(map: &JsonMap, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::Format(format!(
            "dataset '{key}' must be a string, got {other}"
        ))),
    }
}

fn optional_metadata(map: &JsonMap, key: &str, context: &str) -> Result<Metadata> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(val) => Ok(metadata_from_json(object(val, &format!("{context} '{key}'"))?)),
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

impl Channel {
    pub fn to_map(&self) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("channel_type".into(), Value::String(self.channel_type.clone()));
        map.insert("excitation_wavelength".into(), self.excitation_wavelength.into());
        map.insert("emission_wavelength".into(), self.emission_wavelength.into());
        map.insert("exposure_time".into(), self.exposure_time.into());
        map.insert("data".into(), self.data().to_value());
        map.insert("metadata".into(), Value::Object(metadata_to_json(&self.metadata)));
        map
    }

    /// Rebuild a channel; `channel_type` and `data` are required, the
    /// sample array goes through the same validation as construction.
    pub fn from_map(map: &JsonMap) -> Result<Self> {
        const CTX: &str = "channel";
        let channel_type = required(map, "channel_type", CTX)?
            .as_str()
            .ok_or_else(|| Error::Format("channel 'channel_type' must be a string".into()))?;
        let data = Samples::try_from(required(map, "data", CTX)?)?;

        let mut channel = Channel::new(channel_type, data);
        channel.excitation_wavelength = optional_f64(map, "excitation_wavelength", CTX)?;
        channel.emission_wavelength = optional_f64(map, "emission_wavelength", CTX)?;
        channel.exposure_time = optional_f64(map, "exposure_time", CTX)?;
        channel.metadata = optional_metadata(map, "metadata", CTX)?;
        Ok(channel)
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

impl Trace {
    pub fn to_map(&self) -> JsonMap {
        let mut map = JsonMap::new();
        let channels = self
            .channels()
            .iter()
            .map(|c| Value::Object(c.to_map()))
            .collect();
        map.insert("channels".into(), Value::Array(channels));
        map.insert("metadata".into(), Value::Object(metadata_to_json(&self.metadata)));
        map
    }

    pub fn from_map(map: &JsonMap) -> Result<Self> {
        const CTX: &str = "trace";
        let channels = required_array(map, "channels", CTX)?
            .iter()
            .map(|c| Channel::from_map(object(c, "channel")?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Trace::new(channels).with_metadata(optional_metadata(map, "metadata", CTX)?))
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

impl Dataset {
    pub fn to_map(&self) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("title".into(), Value::String(self.title.clone()));
        let traces = self
            .traces()
            .iter()
            .map(|t| Value::Object(t.to_map()))
            .collect();
        map.insert("traces".into(), Value::Array(traces));
        map.insert("metadata".into(), Value::Object(metadata_to_json(&self.metadata)));
        map.insert(
            "sample_details".into(),
            Value::Object(metadata_to_json(&self.sample_details)),
        );
        map.insert(
            "instrument_details".into(),
            Value::Object(metadata_to_json(&self.instrument_details)),
        );

        if let Some(description) = non_empty(&self.description) {
            map.insert("description".into(), description.into());
        }
        if let Some(experiment_type) = non_empty(&self.experiment_type) {
            map.insert("experiment_type".into(), experiment_type.into());
        }
        if !self.authors.is_empty() {
            map.insert("authors".into(), self.authors.clone().into());
        }
        if let Some(institution) = non_empty(&self.institution) {
            map.insert("institution".into(), institution.into());
        }
        if let Some(date) = self.date {
            map.insert("date".into(), date.format(DATE_FORMAT).to_string().into());
        }
        map
    }

    pub fn from_map(map: &JsonMap) -> Result<Self> {
        const CTX: &str = "dataset";
        let title = required(map, "title", CTX)?
            .as_str()
            .ok_or_else(|| Error::Format("dataset 'title' must be a string".into()))?;
        let traces = required_array(map, "traces", CTX)?
            .iter()
            .map(|t| Trace::from_map(object(t, "trace")?))
            .collect::<Result<Vec<_>>>()?;

        let mut dataset = Dataset::with_traces(title, traces);
        dataset.description = optional_string(map, "description")?;
        dataset.experiment_type = optional_string(map, "experiment_type")?;
        dataset.institution = optional_string(map, "institution")?;
        dataset.authors = match map.get("authors") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|a| {
                    a.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Format(format!("dataset 'authors' entries must be strings, got {a}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::Format(format!(
                    "dataset 'authors' must be an array, got {other}"
                )))
            }
        };
        dataset.date = match optional_string(map, "date")? {
            Some(text) if !text.is_empty() => Some(parse_date(&text)?),
            _ => None,
        };
        dataset.metadata = optional_metadata(map, "metadata", CTX)?;
        dataset.sample_details = optional_metadata(map, "sample_details", CTX)?;
        dataset.instrument_details = optional_metadata(map, "instrument_details", CTX)?;
        Ok(dataset)
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn write_pretty<W: Write>(writer: W, dataset: &Dataset) -> Result<()> {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
    Value::Object(dataset.to_map()).serialize(&mut ser)?;
    Ok(())
}

/// Write `dataset` as an indented JSON document.
pub fn write_data(dataset: &Dataset, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|err| Error::io(path, err))?;
    let mut writer = BufWriter::new(file);
    write_pretty(&mut writer, dataset)?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|err| Error::io(path, err))
}

/// Read a JSON document written by [`write_data`] (or any compatible tool).
pub fn read_data(path: &Path) -> Result<Dataset> {
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    let root: Value = serde_json::from_reader(BufReader::new(file))?;
    dataset_from_value(&root)
}

pub fn to_json_string(dataset: &Dataset) -> Result<String> {
    let mut buf = Vec::new();
    write_pretty(&mut buf, dataset)?;
    String::from_utf8(buf).map_err(|err| Error::Format(err.to_string()))
}

pub fn from_json_str(text: &str) -> Result<Dataset> {
    let root: Value = serde_json::from_str(text)?;
    dataset_from_value(&root)
}

fn dataset_from_value(root: &Value) -> Result<Dataset> {
    Dataset::from_map(object(root, "document root")?)
}

/// `%Y-%m-%d` alone accepts unpadded fields such as `2024-1-1`; only text
/// that formats back identically is a valid date.
fn parse_date(text: &str) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|err| {
        Error::Format(format!("dataset 'date' {text:?} is not an ISO-8601 date: {err}"))
    })?;
    if date.format(DATE_FORMAT).to_string() != text {
        return Err(Error::Format(format!(
            "dataset 'date' {text:?} is not a zero-padded YYYY-MM-DD date"
        )));
    }
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::MetadataValue;
    use serde_json::json;

    #[test]
    fn channel_map_keeps_null_scalars() {
        let channel = Channel::new("donor", vec![10_i64, 20, 30]);
        let map = channel.to_map();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "channel_type",
                "excitation_wavelength",
                "emission_wavelength",
                "exposure_time",
                "data",
                "metadata"
            ]
        );
        assert_eq!(map["excitation_wavelength"], Value::Null);
        assert_eq!(map["data"], json!([10, 20, 30]));
        assert_eq!(Channel::from_map(&map).unwrap(), channel);
    }

    #[test]
    fn channel_round_trip_with_scalars() {
        let mut channel = Channel::new("donor", vec![0.5, 1.5]);
        channel.excitation_wavelength = Some(450.0);
        channel.emission_wavelength = Some(530.0);
        channel.exposure_time = Some(0.2);
        channel
            .metadata
            .insert("gain".to_string(), MetadataValue::Integer(2));
        assert_eq!(Channel::from_map(&channel.to_map()).unwrap(), channel);
    }

    #[test]
    fn channel_accepts_integer_scalars_and_missing_optionals() {
        let map = json!({"channel_type": "acceptor", "data": [4, 5, 6], "excitation_wavelength": 488});
        let channel = Channel::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(channel.excitation_wavelength, Some(488.0));
        assert_eq!(channel.exposure_time, None);
        assert!(channel.metadata.is_empty());
    }

    #[test]
    fn channel_requires_type_and_data() {
        let map = json!({"data": [1, 2]});
        assert!(matches!(
            Channel::from_map(map.as_object().unwrap()),
            Err(Error::Format(_))
        ));
        let map = json!({"channel_type": "donor"});
        assert!(matches!(
            Channel::from_map(map.as_object().unwrap()),
            Err(Error::Format(_))
        ));
        let map = json!({"channel_type": "donor", "data": [[1, 2]]});
        assert!(matches!(
            Channel::from_map(map.as_object().unwrap()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn dataset_omits_empty_optionals() {
        let mut ds = Dataset::new("bare");
        ds.description = Some(String::new());
        let map = ds.to_map();
        for key in ["description", "experiment_type", "authors", "institution", "date"] {
            assert!(!map.contains_key(key), "{key} should be omitted");
        }
        for key in ["title", "traces", "metadata", "sample_details", "instrument_details"] {
            assert!(map.contains_key(key), "{key} should be present");
        }
    }

    #[test]
    fn dataset_round_trip_keeps_descriptive_fields() {
        let trace = Trace::new(vec![
            Channel::new("donor", vec![1_i64, 2]),
            Channel::new("acceptor", vec![3_i64, 4]),
        ]);
        let mut ds = Dataset::with_traces("Test Dataset", vec![trace.clone(), trace]);
        ds.description = Some("A test dataset".into());
        ds.experiment_type = Some("smFRET".into());
        ds.authors = vec!["John Doe".into(), "Jane Doe".into()];
        ds.institution = Some("Test University".into());
        ds.date = NaiveDate::from_ymd_opt(2024, 2, 29);
        ds.metadata.insert("global".into(), "info".into());
        ds.sample_details.insert("ph".into(), MetadataValue::Float(7.4));
        let mut other = Metadata::new();
        other.insert("objective".into(), "60x oil 1.5 NA".into());
        ds.instrument_details.insert("other_details".into(), other.into());

        let map = ds.to_map();
        assert_eq!(map["date"], json!("2024-02-29"));
        assert_eq!(Dataset::from_map(&map).unwrap(), ds);
    }

    #[test]
    fn dataset_rejects_bad_documents() {
        let missing_traces = json!({"title": "T"});
        assert!(matches!(
            Dataset::from_map(missing_traces.as_object().unwrap()),
            Err(Error::Format(_))
        ));
        let missing_channels = json!({"title": "T", "traces": [{"metadata": {}}]});
        assert!(matches!(
            Dataset::from_map(missing_channels.as_object().unwrap()),
            Err(Error::Format(_))
        ));
        for text in ["01/02/2024", "2024-1-1", "2024-01-1", "+2024-01-01"] {
            let bad_date = json!({"title": "T", "traces": [], "date": text});
            assert!(
                matches!(
                    Dataset::from_map(bad_date.as_object().unwrap()),
                    Err(Error::Format(_))
                ),
                "{text}"
            );
        }
        assert!(matches!(from_json_str("[1, 2]"), Err(Error::Format(_))));
    }

    #[test]
    fn json_string_uses_four_space_indent() {
        let ds = Dataset::new("indent");
        let text = to_json_string(&ds).unwrap();
        assert!(text.starts_with("{\n    \"title\": \"indent\""), "{text}");
        assert_eq!(from_json_str(&text).unwrap(), ds);
    }

    #[test]
    fn non_finite_samples_survive_as_nan() {
        let channel = Channel::new("donor", vec![1.0, f64::NAN]);
        let ds = Dataset::with_traces("nan", vec![Trace::from_channel(channel)]);
        let text = to_json_string(&ds).unwrap();
        let back = from_json_str(&text).unwrap();
        let floats = back.traces()[0].channels()[0].data().to_f64_vec();
        assert_eq!(floats[0], 1.0);
        assert!(floats[1].is_nan());
    }
}
