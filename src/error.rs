use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed graph json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("progress bar template: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    /// Declared and actual widths disagree.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("dataset has no graphs")]
    EmptyDataset,

    #[error("no model checkpoint at {0:?}; run with --mode train first")]
    MissingCheckpoint(PathBuf),

    #[error("checkpoint {path:?} does not match the model architecture: {reason}")]
    IncompatibleCheckpoint { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
