use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};

use super::loader::{read_matrix_csv, CsvOptions};
use super::model::{Channel, ChannelParams, Metadata, Trace};
use crate::error::{Error, Result};

/// Channel-type filter value that matches every channel in [`Dataset::bulk_set`].
pub const ALL_CHANNELS: &str = "all";

// ---------------------------------------------------------------------------
// Dataset – the root of the document
// ---------------------------------------------------------------------------

/// A named collection of traces plus experiment-level descriptive fields.
///
/// Traces are exposed as a read-only slice and added through
/// [`Dataset::add_trace`], [`Dataset::add_traces`] or the matrix loaders.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub title: String,
    pub description: Option<String>,
    pub experiment_type: Option<String>,
    pub authors: Vec<String>,
    pub institution: Option<String>,
    pub date: Option<NaiveDate>,
    pub metadata: Metadata,
    pub sample_details: Metadata,
    pub instrument_details: Metadata,
    traces: Vec<Trace>,
}

/// Orientation of a trace matrix: one trace per row or one per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Rows,
    Columns,
}

/// Per-parameter count of channels touched by [`Dataset::bulk_set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSetReport {
    pub updated: BTreeMap<String, usize>,
}

/// Outcome of [`Dataset::load_from_matrix`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixLoadReport {
    /// Empty traces created because the dataset had none.
    pub traces_created: usize,
    pub channels_added: usize,
    pub channels_replaced: usize,
}

impl Dataset {
    pub fn new(title: impl Into<String>) -> Self {
        Dataset::with_traces(title, Vec::new())
    }

    pub fn with_traces(title: impl Into<String>, traces: Vec<Trace>) -> Self {
        Dataset {
            title: title.into(),
            description: None,
            experiment_type: None,
            authors: Vec::new(),
            institution: None,
            date: None,
            metadata: Metadata::new(),
            sample_details: Metadata::new(),
            instrument_details: Metadata::new(),
            traces,
        }
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn trace_mut(&mut self, index: usize) -> Option<&mut Trace> {
        self.traces.get_mut(index)
    }

    pub fn add_trace(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn add_traces(&mut self, traces: Vec<Trace>) {
        self.traces.extend(traces);
    }

    /// Number of traces.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Assign the supplied acquisition parameters to every matching channel.
    ///
    /// `channel_type` of `None`, `""` or [`ALL_CHANNELS`] matches every
    /// channel; anything else matches channels with exactly that type.
    pub fn bulk_set(
        &mut self,
        channel_type: Option<&str>,
        params: &ChannelParams,
    ) -> BulkSetReport {
        let filter = channel_type.filter(|t| !t.is_empty() && *t != ALL_CHANNELS);
        let supplied = params.supplied();
        let mut report = BulkSetReport::default();
        for (name, _) in &supplied {
            report.updated.insert((*name).to_string(), 0);
        }

        let matching = self
            .traces
            .iter_mut()
            .flat_map(|trace| trace.channels_mut())
            .filter(|c| filter.map_or(true, |t| c.channel_type == t));
        for channel in matching {
            channel.apply_params(params);
            for (name, _) in &supplied {
                if let Some(count) = report.updated.get_mut(*name) {
                    *count += 1;
                }
            }
        }

        let target = filter.unwrap_or(ALL_CHANNELS);
        for (name, value) in &supplied {
            let count = report.updated.get(*name).copied().unwrap_or(0);
            info!("set {name} = {value} on {count} '{target}' channel(s)");
        }
        report
    }

    /// Load one channel per trace from a numeric matrix.
    ///
    /// Each row (or column, per `orientation`) becomes a channel of
    /// `channel_type`. An empty dataset first gets one empty trace per row;
    /// otherwise the row count must equal the trace count. A trace that
    /// already holds a channel of that type has it replaced.
    pub fn load_from_matrix(
        &mut self,
        channel_type: &str,
        matrix: &[Vec<f64>],
        orientation: Orientation,
        params: &ChannelParams,
    ) -> Result<MatrixLoadReport> {
        let series = match orientation {
            Orientation::Rows => matrix.to_vec(),
            Orientation::Columns => transpose(matrix)?,
        };

        let mut report = MatrixLoadReport::default();
        if self.traces.is_empty() {
            self.traces = vec![Trace::default(); series.len()];
            report.traces_created = series.len();
        } else if series.len() != self.traces.len() {
            return Err(Error::Validation(format!(
                "dataset holds {} traces but the {channel_type} matrix has {} {}",
                self.traces.len(),
                series.len(),
                match orientation {
                    Orientation::Rows => "rows",
                    Orientation::Columns => "columns",
                }
            )));
        }

        for (trace, samples) in self.traces.iter_mut().zip(series) {
            let channel = Channel::new(channel_type, samples).with_params(params);
            if trace.replace_or_add(channel) {
                if report.channels_replaced == 0 {
                    warn!("replacing existing '{channel_type}' channels with matrix data");
                }
                report.channels_replaced += 1;
            } else {
                report.channels_added += 1;
            }
        }
        Ok(report)
    }

    /// Parse a headerless numeric CSV and hand it to [`Dataset::load_from_matrix`].
    pub fn load_from_csv(
        &mut self,
        channel_type: &str,
        path: &Path,
        orientation: Orientation,
        params: &ChannelParams,
    ) -> Result<MatrixLoadReport> {
        let opts = CsvOptions::default();
        self.load_from_csv_with(channel_type, path, orientation, params, &opts)
    }

    pub fn load_from_csv_with(
        &mut self,
        channel_type: &str,
        path: &Path,
        orientation: Orientation,
        params: &ChannelParams,
        opts: &CsvOptions,
    ) -> Result<MatrixLoadReport> {
        let matrix = read_matrix_csv(path, opts)?;
        self.load_from_matrix(channel_type, &matrix, orientation, params)
    }
}

/// Columns of a rectangular matrix.
fn transpose(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let width = matrix.first().map_or(0, Vec::len);
    if let Some((i, row)) = matrix.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(Error::Validation(format!(
            "matrix is not rectangular: row 0 has {width} values but row {i} has {}",
            row.len()
        )));
    }
    Ok((0..width)
        .map(|col| matrix.iter().map(|row| row[col]).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::EXCITATION_WAVELENGTH;

    fn two_trace_dataset() -> Dataset {
        let traces = (0..2)
            .map(|i| {
                Trace::new(vec![
                    Channel::new("donor", vec![i as f64, 1.0]),
                    Channel::new("acceptor", vec![2.0, i as f64]),
                ])
            })
            .collect();
        Dataset::with_traces("bulk", traces)
    }

    #[test]
    fn bulk_set_filters_by_channel_type() {
        let mut ds = two_trace_dataset();
        let params = ChannelParams {
            excitation_wavelength: Some(532.0),
            ..Default::default()
        };
        let report = ds.bulk_set(Some("donor"), &params);
        assert_eq!(report.updated.get(EXCITATION_WAVELENGTH), Some(&2));
        assert_eq!(report.updated.len(), 1);
        for trace in ds.traces() {
            assert_eq!(trace.channel("donor").unwrap().excitation_wavelength, Some(532.0));
            assert_eq!(trace.channel("acceptor").unwrap().excitation_wavelength, None);
        }
    }

    #[test]
    fn bulk_set_all_sentinel_matches_everything() {
        let mut ds = two_trace_dataset();
        let params = ChannelParams {
            exposure_time: Some(0.1),
            ..Default::default()
        };
        let report = ds.bulk_set(Some(ALL_CHANNELS), &params);
        assert_eq!(report.updated.get("exposure_time"), Some(&4));
        let report = ds.bulk_set(None, &params);
        assert_eq!(report.updated.get("exposure_time"), Some(&4));
        assert!(ds
            .traces()
            .iter()
            .flat_map(|t| t.channels())
            .all(|c| c.exposure_time == Some(0.1)));
    }

    #[test]
    fn matrix_on_empty_dataset_creates_traces() {
        let mut ds = Dataset::new("matrix");
        let matrix = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let report = ds
            .load_from_matrix("donor", &matrix, Orientation::Rows, &ChannelParams::default())
            .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(report.traces_created, 3);
        assert_eq!(report.channels_added, 3);
        assert_eq!(
            ds.traces()[2].channel("donor").unwrap().data().as_floats(),
            Some(&[5.0, 6.0][..])
        );
    }

    #[test]
    fn matrix_row_count_must_match_traces() {
        let mut ds = two_trace_dataset();
        let matrix = vec![vec![1.0], vec![2.0], vec![3.0]];
        let err = ds
            .load_from_matrix("donor", &matrix, Orientation::Rows, &ChannelParams::default())
            .unwrap_err();
        match err {
            Error::Validation(msg) => {
                assert!(msg.contains('2') && msg.contains('3'), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn matrix_columns_replace_existing_channels() {
        let mut ds = two_trace_dataset();
        let matrix = vec![vec![7.0, 8.0], vec![7.5, 8.5], vec![7.25, 8.25]];
        let params = ChannelParams {
            emission_wavelength: Some(680.0),
            ..Default::default()
        };
        let report = ds
            .load_from_matrix("acceptor", &matrix, Orientation::Columns, &params)
            .unwrap();
        assert_eq!(report.channels_replaced, 2);
        assert_eq!(report.channels_added, 0);
        let acceptor = ds.traces()[1].channel("acceptor").unwrap();
        assert_eq!(acceptor.data().as_floats(), Some(&[8.0, 8.5, 8.25][..]));
        assert_eq!(acceptor.emission_wavelength, Some(680.0));
        assert_eq!(ds.traces()[1].len(), 2);
    }

    #[test]
    fn ragged_matrix_rejected_for_columns() {
        let mut ds = Dataset::new("ragged");
        let matrix = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            ds.load_from_matrix("donor", &matrix, Orientation::Columns, &ChannelParams::default()),
            Err(Error::Validation(_))
        ));
        assert!(ds.is_empty());
    }
}
