//! Interchange data model for single-molecule FRET traces.
//!
//! A [`Dataset`] owns [`Trace`]s, each trace owns the [`Channel`]s recorded
//! for one molecule. Datasets persist as JSON documents through
//! [`write_data`] / [`read_data`] and can be assembled from CSV files with
//! [`load_csv_traces`] or [`Dataset::load_from_csv`].
//!
//! Advisories (unequal channel lengths, skipped CSV cells, replaced channels)
//! are reported through the `log` facade.

pub mod data;
pub mod error;

pub use data::dataset::{BulkSetReport, Dataset, MatrixLoadReport, Orientation, ALL_CHANNELS};
pub use data::format::{from_json_str, read_data, to_json_string, write_data};
pub use data::loader::{load_csv_traces, load_csv_traces_with, read_matrix_csv, CsvOptions};
pub use data::model::{
    Channel, ChannelParams, Metadata, MetadataValue, SampleKind, Samples, Trace,
};
pub use error::{Error, Result};
