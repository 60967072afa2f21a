use std::fs::File;
use std::path::Path;

use log::{debug, error, info, warn};
use walkdir::WalkDir;

use super::dataset::Dataset;
use super::model::{Channel, Metadata, Trace};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings shared by both CSV layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// File extension (without the dot) picked up by the directory walk.
    pub extension: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            extension: "csv".to_string(),
        }
    }
}

impl CsvOptions {
    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.delimiter(self.delimiter).trim(csv::Trim::All);
        builder
    }
}

// ---------------------------------------------------------------------------
// Labeled directory tree (header mode)
// ---------------------------------------------------------------------------

/// Load a dataset from a folder of labeled CSV traces.
///
/// Layout:
/// ```text
///  root/
///  ├── condition_A/
///  │   ├── trace1.csv      donor,acceptor
///  │   └── trace2.csv      812.0,140.5
///  └── condition_B/        ...
///      └── trace3.csv
/// ```
/// Every immediate subfolder is a label; each CSV inside it becomes one
/// trace with one channel per header column. The dataset title is the
/// root folder's name.
pub fn load_csv_traces(root: &Path) -> Result<Dataset> {
    load_csv_traces_with(root, &CsvOptions::default())
}

pub fn load_csv_traces_with(root: &Path, opts: &CsvOptions) -> Result<Dataset> {
    let meta = std::fs::metadata(root).map_err(|err| Error::io(root, err))?;
    if !meta.is_dir() {
        return Err(Error::io(root, std::io::Error::other("not a directory")));
    }
    let title = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .or_else(|| {
            let resolved = root.canonicalize().ok()?;
            Some(resolved.file_name()?.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    let mut dataset = Dataset::new(title);

    let label_dirs = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in label_dirs {
        let entry = entry.map_err(|err| walk_error(root, err))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let label = entry.file_name().to_string_lossy().into_owned();
        let files = WalkDir::new(entry.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    error!("skipping unreadable entry under {label}: {err}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && has_extension(e.path(), &opts.extension));

        for file in files {
            let filename = file.file_name().to_string_lossy().into_owned();
            match read_labeled_csv(file.path(), opts) {
                Ok(channels) if channels.is_empty() => {
                    warn!("no valid data channels found in {}", file.path().display());
                }
                Ok(channels) => {
                    debug!(
                        "{}: {} channel(s) under label '{label}'",
                        file.path().display(),
                        channels.len()
                    );
                    let mut metadata = Metadata::new();
                    metadata.insert("label".to_string(), label.as_str().into());
                    metadata.insert("filename".to_string(), filename.into());
                    dataset.add_trace(Trace::new(channels).with_metadata(metadata));
                }
                Err(err) => error!("error loading {}: {err}", file.path().display()),
            }
        }
    }

    info!(
        "loaded {} trace(s) from {} into dataset '{}'",
        dataset.len(),
        root.display(),
        dataset.title
    );
    Ok(dataset)
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(source) => Error::io(path, source),
        None => Error::Format(format!("cannot walk {}", path.display())),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

/// One channel per header column. Cells that do not parse as numbers are
/// skipped, so the affected channel ends up shorter than its siblings.
fn read_labeled_csv(path: &Path, opts: &CsvOptions) -> Result<Vec<Channel>> {
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    let mut reader = opts
        .reader_builder()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        for (col, samples) in columns.iter_mut().enumerate() {
            let cell = record.get(col).unwrap_or("");
            match cell.parse::<f64>() {
                Ok(v) => samples.push(v),
                Err(_) => warn!(
                    "skipping invalid value '{cell}' in {}, row {}, column '{}'",
                    path.display(),
                    row_no + 1,
                    headers[col]
                ),
            }
        }
    }

    Ok(headers
        .into_iter()
        .zip(columns)
        .filter(|(_, samples)| !samples.is_empty())
        .map(|(name, samples)| Channel::new(name, samples))
        .collect())
}

// ---------------------------------------------------------------------------
// Headerless numeric matrix (matrix mode)
// ---------------------------------------------------------------------------

/// Read a rectangular, headerless matrix of floats.
///
/// `NaN` text is accepted for missing samples; any other cell that does not
/// parse is a [`Error::Format`] naming its position. Unequal row lengths are
/// reported by the CSV reader.
pub fn read_matrix_csv(path: &Path, opts: &CsvOptions) -> Result<Vec<Vec<f64>>> {
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    let mut reader = opts.reader_builder().has_headers(false).from_reader(file);

    let mut matrix = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let row = record
            .iter()
            .enumerate()
            .map(|(col, cell)| {
                cell.parse::<f64>().map_err(|_| {
                    Error::Format(format!(
                        "{}: row {}, column {}: '{cell}' is not a number",
                        path.display(),
                        row_no + 1,
                        col + 1
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        matrix.push(row);
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn labeled_csv_skips_bad_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        fs::write(&path, "donor,acceptor\n1.0,2.0\nx,3.0\n4.0,\n").unwrap();

        let channels = read_labeled_csv(&path, &CsvOptions::default()).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].data().as_floats(), Some(&[1.0, 4.0][..]));
        assert_eq!(channels[1].data().as_floats(), Some(&[2.0, 3.0][..]));
    }

    #[test]
    fn labeled_csv_drops_empty_channels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        fs::write(&path, "donor,notes\n1.0,a\n2.0,b\n").unwrap();

        let channels = read_labeled_csv(&path, &CsvOptions::default()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_type, "donor");
    }

    #[test]
    fn matrix_csv_parses_rows_and_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("donor.csv");
        fs::write(&path, "1.0, 2.0, 3.0\n4.0, NaN, 6.0\n").unwrap();

        let matrix = read_matrix_csv(&path, &CsvOptions::default()).unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0], vec![1.0, 2.0, 3.0]);
        assert!(matrix[1][1].is_nan());
    }

    #[test]
    fn matrix_csv_rejects_text_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("donor.csv");
        fs::write(&path, "1.0,2.0\n3.0,oops\n").unwrap();

        match read_matrix_csv(&path, &CsvOptions::default()) {
            Err(Error::Format(msg)) => assert!(msg.contains("row 2, column 2"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn matrix_csv_honours_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("donor.tsv");
        fs::write(&path, "1\t2\n3\t4\n").unwrap();

        let opts = CsvOptions {
            delimiter: b'\t',
            ..Default::default()
        };
        let matrix = read_matrix_csv(&path, &opts).unwrap();
        assert_eq!(matrix, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }
}
