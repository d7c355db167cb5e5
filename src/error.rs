use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the pipeline can produce. All of them abort the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("data format error: {0}")]
    DataFormat(#[from] DataFormatError),

    #[error("training diverged at epoch {epoch}, batch {batch}: loss = {loss}")]
    TrainingDivergence { epoch: usize, batch: usize, loss: f64 },

    #[error("export validation failed: {0}")]
    ExportValidation(String),

    #[error("inference verification failed: {0}")]
    InferenceVerification(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("cannot decode ONNX artifact: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Problems found while reading the feature and label tables.
///
/// Row and column numbers are 1-based and count non-blank lines only.
#[derive(Debug, Error)]
pub enum DataFormatError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} contains no data rows")]
    Empty { path: PathBuf },

    #[error("{path}, row {row}, column {column}: '{cell}' is not a valid number")]
    Parse {
        path: PathBuf,
        row: usize,
        column: usize,
        cell: String,
    },

    #[error("{path}, row {row}: expected {expected} columns, found {found}")]
    RaggedRow {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{path}, row {row}: label table must have exactly one column, found {found}")]
    LabelColumns { path: PathBuf, row: usize, found: usize },

    #[error("row count mismatch: {features} feature rows vs {labels} label rows")]
    RowCountMismatch { features: usize, labels: usize },

    #[error("row {row}: label {label} is outside [0, {num_classes})")]
    LabelOutOfRange {
        row: usize,
        label: usize,
        num_classes: usize,
    },
}
