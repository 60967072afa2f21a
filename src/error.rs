use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the data model, the JSON document format and the CSV
/// loaders.
///
/// Advisory conditions (ragged channel lengths, skipped CSV cells, channel
/// replacement during a matrix load) are not errors; they go through `log`.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong argument kind, e.g. appending floats to an integer channel.
    #[error("type error: {0}")]
    Type(String),

    /// Argument of the right kind that breaks a structural invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed persisted document or matrix file.
    #[error("format error: {0}")]
    Format(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing_key(key: &str, context: &str) -> Self {
        Error::Format(format!("{context} is missing required key '{key}'"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
