//! Heliocentric position acquisition
//!
//! ## Pipeline
//! - `Registry`: which bodies are queried, in order
//! - `VectorQuery` / `QueryInstant`: per-body Horizons request for one shared instant
//! - `parse_vector`: tolerant extraction of (x, y, z) from the result table
//! - `Fetcher`: one body, retried with backoff and jitter
//! - `BatchAcquirer`: all bodies under a pacing policy, partitioned results
//! - `CacheGate`: single cached batch, TTL, stale fallback

// ============ Errors ============
mod error;
pub use error::{AcquireError, FetchError, ParseError};

// ============ Bodies and Requests ============
mod registry;
pub use registry::{AuxiliaryBody, BodySpec, Designator, MAJOR_BODIES, Registry, RegistryError};

mod request;
pub use request::{HORIZONS_TIME_FORMAT, QueryInstant, VectorQuery};

// ============ Parsing ============
mod parser;
pub use parser::{END_MARKER, START_MARKER, Vector3, parse_vector};

// ============ Upstream Client ============
mod client;
pub use client::{EphemerisSource, HORIZONS_API_URL, HorizonsClient, extract_result};

// ============ Acquisition ============
mod fetcher;
pub use fetcher::{BodyResult, Fetcher, RetryPolicy};

mod aggregator;
pub use aggregator::{BatchAcquirer, Pacing, TotalFailure};

// ============ Cache ============
mod gate;
pub use gate::{CacheGate, CacheState, CacheStatus, DEFAULT_TTL_SECONDS, GateSettings};

#[cfg(test)]
pub(crate) mod testing;
