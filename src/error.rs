use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures raised by the fetch, remap and store layers.
///
/// Adapters wrap these in `anyhow::Error` with context; tests and callers that
/// need to branch on the kind can `downcast_ref::<ScrapeError>()`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request to {url} failed with status {status}")]
    Request { url: String, status: u16 },

    #[error("transport failure for {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("marker `{marker}` did not appear on {url} within {timeout:?}")]
    RenderTimeout {
        url: String,
        marker: String,
        timeout: Duration,
    },

    #[error("browser session failed: {0:#}")]
    Browser(anyhow::Error),

    #[error("no usable proxy after {attempts} attempts")]
    ProxyExhausted { attempts: usize },

    #[error("invalid fetch configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read proxy list {path}")]
    ProxyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key `{key}` not found in record")]
    KeyNotFound { key: String },

    #[error("field `{field}` has no column mapping for {source_name}")]
    UnmappedField { field: String, source_name: String },

    #[error("failed to open field mapping {path}")]
    MappingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed field mapping {path}")]
    MappingFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("row is missing primary key `{key}` for table {table}")]
    MissingPrimaryKey { key: String, table: &'static str },

    #[error("column `{column}` does not exist in table {table}")]
    UnknownColumn { column: String, table: &'static str },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;
