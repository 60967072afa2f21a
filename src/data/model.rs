use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// MetadataValue – a single user-defined annotation
// ---------------------------------------------------------------------------

/// A dynamically-typed annotation value mirroring the JSON value model.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<MetadataValue>),
    Map(Metadata),
}

/// Free-form key/value annotations attached to a channel, trace or dataset.
/// Keys are kept sorted so serialized documents have a stable order.
pub type Metadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    pub fn from_json(val: &Value) -> Self {
        match val {
            Value::Null => MetadataValue::Null,
            Value::Bool(b) => MetadataValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetadataValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    MetadataValue::Float(f)
                } else {
                    MetadataValue::String(n.to_string())
                }
            }
            Value::String(s) => MetadataValue::String(s.clone()),
            Value::Array(items) => {
                MetadataValue::List(items.iter().map(MetadataValue::from_json).collect())
            }
            Value::Object(obj) => MetadataValue::Map(metadata_from_json(obj)),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetadataValue::Null => Value::Null,
            MetadataValue::Bool(b) => Value::Bool(*b),
            MetadataValue::Integer(i) => Value::from(*i),
            MetadataValue::Float(f) => Value::from(*f),
            MetadataValue::String(s) => Value::String(s.clone()),
            MetadataValue::List(items) => {
                Value::Array(items.iter().map(MetadataValue::to_json).collect())
            }
            MetadataValue::Map(map) => Value::Object(metadata_to_json(map)),
        }
    }

    /// Interpret the value as an `f64` when it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
            MetadataValue::List(_) | MetadataValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<Metadata> for MetadataValue {
    fn from(map: Metadata) -> Self {
        MetadataValue::Map(map)
    }
}

pub fn metadata_from_json(obj: &Map<String, Value>) -> Metadata {
    obj.iter()
        .map(|(key, val)| (key.clone(), MetadataValue::from_json(val)))
        .collect()
}

pub fn metadata_to_json(metadata: &Metadata) -> Map<String, Value> {
    metadata
        .iter()
        .map(|(key, val)| (key.clone(), val.to_json()))
        .collect()
}

// ---------------------------------------------------------------------------
// Samples – the intensity series of one channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Int,
    Float,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Int => write!(f, "integer"),
            SampleKind::Float => write!(f, "float"),
        }
    }
}

/// A flat, homogeneous sequence of numeric samples.
///
/// Integer and floating-point samples are never mixed and never promoted
/// into one another. An empty sequence has no meaningful kind: two empty
/// sequences compare equal, and appending to an empty sequence adopts the
/// kind of the appended values.
#[derive(Debug, Clone)]
pub enum Samples {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Default for Samples {
    fn default() -> Self {
        Samples::Float(Vec::new())
    }
}

impl PartialEq for Samples {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Samples::Int(a), Samples::Int(b)) => a == b,
            (Samples::Float(a), Samples::Float(b)) => a == b,
            _ => self.is_empty() && other.is_empty(),
        }
    }
}

impl Samples {
    pub fn kind(&self) -> SampleKind {
        match self {
            Samples::Int(_) => SampleKind::Int,
            Samples::Float(_) => SampleKind::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Samples::Int(v) => Some(v),
            Samples::Float(_) => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Samples::Float(v) => Some(v),
            Samples::Int(_) => None,
        }
    }

    /// Copy the samples out as `f64`, widening integers.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Samples::Int(v) => v.iter().map(|&i| i as f64).collect(),
            Samples::Float(v) => v.clone(),
        }
    }

    /// Append `other`, which must be of the same kind unless `self` is empty.
    pub fn extend(&mut self, other: Samples) -> Result<()> {
        if self.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.is_empty() {
            return Ok(());
        }
        match (self, other) {
            (Samples::Int(a), Samples::Int(b)) => a.extend(b),
            (Samples::Float(a), Samples::Float(b)) => a.extend(b),
            (existing, other) => {
                return Err(Error::Type(format!(
                    "cannot append {} samples to a channel holding {} samples",
                    other.kind(),
                    existing.kind()
                )))
            }
        }
        Ok(())
    }

    /// Validate a JSON array of samples.
    ///
    /// Elements must be plain numbers, all integers or all floats. `null`
    /// stands for a missing float sample and is read back as `NaN`.
    pub fn from_values(values: &[Value]) -> Result<Self> {
        let mut ints = Vec::new();
        let mut floats = Vec::new();
        for (i, val) in values.iter().enumerate() {
            match val {
                Value::Array(_) => {
                    return Err(Error::Validation(format!(
                        "data must be a flat sequence, element {i} is a nested sequence"
                    )))
                }
                Value::Null => floats.push(f64::NAN),
                Value::Number(n) => {
                    if let Some(x) = n.as_i64() {
                        ints.push(x);
                    } else if n.is_u64() {
                        return Err(Error::Validation(format!(
                            "data element {i} ({n}) does not fit a 64-bit signed integer"
                        )));
                    } else if let Some(x) = n.as_f64() {
                        floats.push(x);
                    }
                }
                other => {
                    return Err(Error::Validation(format!(
                        "data element {i} is not a number: {other}"
                    )))
                }
            }
        }
        match (ints.is_empty(), floats.is_empty()) {
            (false, false) => Err(Error::Validation(
                "data must hold numbers of a single type (all integer or all float)".into(),
            )),
            (false, true) => Ok(Samples::Int(ints)),
            _ => Ok(Samples::Float(floats)),
        }
    }

    /// Non-finite floats become `null`, the JSON serializer's convention.
    pub fn to_value(&self) -> Value {
        match self {
            Samples::Int(v) => Value::Array(v.iter().map(|&i| Value::from(i)).collect()),
            Samples::Float(v) => Value::Array(v.iter().map(|&x| Value::from(x)).collect()),
        }
    }
}

impl TryFrom<&Value> for Samples {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Samples::from_values(items),
            other => Err(Error::Type(format!(
                "data must be a sequence of numbers, got {other}"
            ))),
        }
    }
}

impl TryFrom<Value> for Samples {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Samples::try_from(&value)
    }
}

impl From<Vec<i64>> for Samples {
    fn from(v: Vec<i64>) -> Self {
        Samples::Int(v)
    }
}

impl From<Vec<f64>> for Samples {
    fn from(v: Vec<f64>) -> Self {
        Samples::Float(v)
    }
}

impl From<&[i64]> for Samples {
    fn from(v: &[i64]) -> Self {
        Samples::Int(v.to_vec())
    }
}

impl From<&[f64]> for Samples {
    fn from(v: &[f64]) -> Self {
        Samples::Float(v.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for Samples {
    fn from(v: [i64; N]) -> Self {
        Samples::Int(v.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Samples {
    fn from(v: [f64; N]) -> Self {
        Samples::Float(v.to_vec())
    }
}

impl From<i64> for Samples {
    fn from(v: i64) -> Self {
        Samples::Int(vec![v])
    }
}

impl From<f64> for Samples {
    fn from(v: f64) -> Self {
        Samples::Float(vec![v])
    }
}

// ---------------------------------------------------------------------------
// ChannelParams – optional acquisition scalars
// ---------------------------------------------------------------------------

pub const EXCITATION_WAVELENGTH: &str = "excitation_wavelength";
pub const EMISSION_WAVELENGTH: &str = "emission_wavelength";
pub const EXPOSURE_TIME: &str = "exposure_time";

/// Optional acquisition parameters applied to channels in bulk.
/// `None` leaves the corresponding channel field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelParams {
    /// Nanometers.
    pub excitation_wavelength: Option<f64>,
    /// Nanometers.
    pub emission_wavelength: Option<f64>,
    /// Seconds.
    pub exposure_time: Option<f64>,
}

impl ChannelParams {
    pub fn is_empty(&self) -> bool {
        self.excitation_wavelength.is_none()
            && self.emission_wavelength.is_none()
            && self.exposure_time.is_none()
    }

    /// Build parameters from a loosely-typed map, e.g. a JSON settings object.
    ///
    /// Every non-null value must be a floating-point number; integers and
    /// other kinds are rejected with [`Error::Type`] naming the parameter.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut params = ChannelParams::default();
        for (key, value) in map {
            let slot = match key.as_str() {
                EXCITATION_WAVELENGTH => &mut params.excitation_wavelength,
                EMISSION_WAVELENGTH => &mut params.emission_wavelength,
                EXPOSURE_TIME => &mut params.exposure_time,
                other => {
                    return Err(Error::Type(format!("unknown channel parameter '{other}'")))
                }
            };
            *slot = match value {
                Value::Null => None,
                Value::Number(n) if n.is_f64() => n.as_f64(),
                other => {
                    return Err(Error::Type(format!("{key} must be a float, got {other}")))
                }
            };
        }
        Ok(params)
    }

    /// Supplied parameters as `(name, value)` pairs.
    pub fn supplied(&self) -> Vec<(&'static str, f64)> {
        [
            (EXCITATION_WAVELENGTH, self.excitation_wavelength),
            (EMISSION_WAVELENGTH, self.emission_wavelength),
            (EXPOSURE_TIME, self.exposure_time),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Channel – one intensity-vs-time series
// ---------------------------------------------------------------------------

/// One recorded channel (e.g. donor or acceptor emission) of a trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Free-form label such as `"donor"` or `"acceptor"`.
    pub channel_type: String,
    /// Nanometers.
    pub excitation_wavelength: Option<f64>,
    /// Nanometers.
    pub emission_wavelength: Option<f64>,
    /// Seconds.
    pub exposure_time: Option<f64>,
    pub metadata: Metadata,
    data: Samples,
}

impl Channel {
    pub fn new(channel_type: impl Into<String>, data: impl Into<Samples>) -> Self {
        Channel {
            channel_type: channel_type.into(),
            excitation_wavelength: None,
            emission_wavelength: None,
            exposure_time: None,
            metadata: Metadata::new(),
            data: data.into(),
        }
    }

    pub fn with_params(mut self, params: &ChannelParams) -> Self {
        self.apply_params(params);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Overwrite the scalars that `params` supplies.
    pub fn apply_params(&mut self, params: &ChannelParams) {
        if let Some(v) = params.excitation_wavelength {
            self.excitation_wavelength = Some(v);
        }
        if let Some(v) = params.emission_wavelength {
            self.emission_wavelength = Some(v);
        }
        if let Some(v) = params.exposure_time {
            self.exposure_time = Some(v);
        }
    }

    pub fn data(&self) -> &Samples {
        &self.data
    }

    /// Replace the samples wholesale.
    pub fn set_data(&mut self, data: impl Into<Samples>) {
        self.data = data.into();
    }

    /// Append one sample or a sequence of samples.
    ///
    /// A channel that already holds samples only accepts samples of the same
    /// kind; an empty channel takes the kind of the first append.
    pub fn append(&mut self, values: impl Into<Samples>) -> Result<()> {
        self.data.extend(values.into()).map_err(|err| match err {
            Error::Type(msg) => Error::Type(format!("channel '{}': {msg}", self.channel_type)),
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Trace – the channels recorded for one molecule
// ---------------------------------------------------------------------------

/// All channels recorded simultaneously for one observed molecule.
///
/// Channels are exposed read-only; additions go through [`Trace::add_channel`]
/// and [`Trace::add_channels`], which re-run the advisory length check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    channels: Vec<Channel>,
    pub metadata: Metadata,
}

impl Trace {
    pub fn new(channels: Vec<Channel>) -> Self {
        let trace = Trace {
            channels,
            metadata: Metadata::new(),
        };
        trace.check_lengths();
        trace
    }

    pub fn from_channel(channel: Channel) -> Self {
        Trace::new(vec![channel])
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// First channel with the given type.
    pub fn channel(&self, channel_type: &str) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.channel_type == channel_type)
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    pub fn channel_of_type_mut(&mut self, channel_type: &str) -> Option<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|c| c.channel_type == channel_type)
    }

    pub(crate) fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.iter_mut()
    }

    pub fn add_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
        self.check_lengths();
    }

    pub fn add_channels(&mut self, channels: Vec<Channel>) {
        self.channels.extend(channels);
        self.check_lengths();
    }

    /// Replace the first channel of the same type, or append if none exists.
    /// Returns `true` when a channel was replaced.
    pub(crate) fn replace_or_add(&mut self, channel: Channel) -> bool {
        let replaced = match self.channel_of_type_mut(&channel.channel_type) {
            Some(existing) => {
                *existing = channel;
                true
            }
            None => {
                self.channels.push(channel);
                false
            }
        };
        self.check_lengths();
        replaced
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Whether every channel holds the same number of samples.
    pub fn lengths_consistent(&self) -> bool {
        let mut lengths = self.channels.iter().map(Channel::len);
        match lengths.next() {
            Some(first) => lengths.all(|len| len == first),
            None => true,
        }
    }

    fn check_lengths(&self) {
        if !self.lengths_consistent() {
            let lengths: Vec<(&str, usize)> = self
                .channels
                .iter()
                .map(|c| (c.channel_type.as_str(), c.len()))
                .collect();
            warn!("channels in trace are not all of equal length: {lengths:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_keeps_data_and_defaults() {
        let channel = Channel::new("acceptor", vec![4_i64, 5, 6]);
        assert_eq!(channel.channel_type, "acceptor");
        assert_eq!(channel.data().as_ints(), Some(&[4_i64, 5, 6][..]));
        assert!(channel.metadata.is_empty());
        assert_eq!(channel.excitation_wavelength, None);
    }

    #[test]
    fn nested_data_is_rejected() {
        let err = Samples::try_from(json!([[1, 2]])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }

    #[test]
    fn mixed_data_is_rejected() {
        let err = Samples::try_from(json!([1, 2.5])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }

    #[test]
    fn non_numeric_data_is_rejected() {
        assert!(matches!(
            Samples::try_from(json!([1, "two"])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(Samples::try_from(json!(3)), Err(Error::Type(_))));
    }

    #[test]
    fn null_samples_read_as_nan() {
        let samples = Samples::try_from(json!([1.5, null])).unwrap();
        let floats = samples.as_floats().unwrap();
        assert_eq!(floats[0], 1.5);
        assert!(floats[1].is_nan());
        assert!(matches!(
            Samples::try_from(json!([1, null])),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn append_requires_matching_kind() {
        let mut channel = Channel::new("donor", vec![1_i64, 2, 3]);
        let err = channel.append(4.0).unwrap_err();
        assert!(matches!(err, Error::Type(_)), "{err}");
        channel.append(vec![4_i64, 5]).unwrap();
        assert_eq!(channel.data().as_ints(), Some(&[1_i64, 2, 3, 4, 5][..]));
    }

    #[test]
    fn empty_channel_adopts_first_kind() {
        let mut channel = Channel::new("donor", Samples::default());
        channel.append(vec![10_i64, 20]).unwrap();
        assert_eq!(channel.data().kind(), SampleKind::Int);
        assert!(matches!(channel.append(1.5), Err(Error::Type(_))));
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn set_data_replaces_wholesale() {
        let mut channel = Channel::new("donor", vec![1_i64, 2]);
        channel.set_data(vec![0.5, 0.25]);
        assert_eq!(channel.data().as_floats(), Some(&[0.5, 0.25][..]));
    }

    #[test]
    fn empty_samples_compare_equal() {
        assert_eq!(Samples::Int(Vec::new()), Samples::Float(Vec::new()));
        assert_ne!(Samples::Int(vec![1]), Samples::Float(vec![1.0]));
    }

    #[test]
    fn params_from_map_rejects_non_floats() {
        let map = json!({"excitation_wavelength": 532.0, "exposure_time": null});
        let params = ChannelParams::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(params.excitation_wavelength, Some(532.0));
        assert_eq!(params.exposure_time, None);

        let bad = json!({"emission_wavelength": 585});
        let err = ChannelParams::from_map(bad.as_object().unwrap()).unwrap_err();
        match err {
            Error::Type(msg) => assert!(msg.contains("emission_wavelength")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn trace_length_check_is_advisory() {
        let mut trace = Trace::new(vec![
            Channel::new("donor", vec![1_i64, 2, 3]),
            Channel::new("acceptor", vec![4_i64, 5, 6]),
        ]);
        assert!(trace.lengths_consistent());
        trace.add_channel(Channel::new("alex", vec![7_i64]));
        assert_eq!(trace.len(), 3);
        assert!(!trace.lengths_consistent());
    }

    #[test]
    fn replace_or_add_swaps_same_type() {
        let mut trace = Trace::from_channel(Channel::new("donor", vec![1.0, 2.0]));
        assert!(!trace.replace_or_add(Channel::new("acceptor", vec![3.0, 4.0])));
        assert!(trace.replace_or_add(Channel::new("donor", vec![9.0, 9.0])));
        assert_eq!(trace.len(), 2);
        assert_eq!(
            trace.channel("donor").unwrap().data().as_floats(),
            Some(&[9.0, 9.0][..])
        );
    }

    #[test]
    fn metadata_value_json_conversion() {
        let json = json!({"pH": 7.4, "runs": 3, "tags": ["a", true], "nested": {"k": null}});
        let metadata = metadata_from_json(json.as_object().unwrap());
        assert_eq!(metadata["pH"], MetadataValue::Float(7.4));
        assert_eq!(metadata["runs"], MetadataValue::Integer(3));
        assert_eq!(Value::Object(metadata_to_json(&metadata)), json);
    }
}
