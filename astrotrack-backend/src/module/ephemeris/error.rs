//! Error taxonomy of the acquisition pipeline

use thiserror::Error;

/// Why a payload could not be turned into a position vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("start marker {0} not found in payload")]
    MissingStartMarker(&'static str),

    #[error("end marker {0} not found after start marker")]
    MissingEndMarker(&'static str),

    #[error("no data rows between markers")]
    Empty,

    #[error("no known table layout matched the data rows")]
    UnrecognizedLayout,

    #[error("{axis} component {raw:?} is not a finite number")]
    NonFinite { axis: char, raw: String },
}

/// A single failed attempt. Every variant is retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP error {0}")]
    Status(u16),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Hard failure surfaced to callers of the cache gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquireError {
    #[error("no position data available: all {attempted} bodies failed ({last_error})")]
    NoData { attempted: usize, last_error: String },
}
