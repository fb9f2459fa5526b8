//! Error types for fetching and aggregation.
//!
//! Caller mistakes (`InvalidParameters`, `InvalidKeyField`) are reported
//! before any I/O happens. `FetchFailed` is terminal for one query and
//! always carries the last attempt's cause.

use thiserror::Error;

/// Errors surfaced by the fetch and aggregation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller passed an out-of-range page size, page ceiling or
    /// concurrency limit.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Every attempt at fetching one page failed.
    #[error("fetching {endpoint} failed on page {page} after {attempts} attempts: {cause}")]
    FetchFailed {
        endpoint: String,
        page: usize,
        attempts: usize,
        #[source]
        cause: AttemptError,
    },

    /// An aggregation was asked to group or sum by an empty field name.
    #[error("aggregation field name must not be empty")]
    InvalidKeyField,
}

/// Why a single HTTP attempt failed. All variants are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The upstream answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, timeout or other transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx response whose body was not the expected JSON envelope.
    #[error("malformed response body: {0}")]
    Decode(String),
}

impl AttemptError {
    /// Build a status error, keeping only the start of the body.
    pub fn status(status: u16, body: &str) -> Self {
        const MAX_BODY: usize = 200;
        let body = match body.char_indices().nth(MAX_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        AttemptError::Status { status, body }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
