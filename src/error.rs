use thiserror::Error;

use crate::source::SourceError;

/// Errors surfaced by the library's fallible edges (config, history, traces).
///
/// Filtering decisions are not errors and never appear here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid trace file: {0}")]
    Csv(#[from] csv::Error),
    #[error("sample source failed to start: {0}")]
    Source(#[from] SourceError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
