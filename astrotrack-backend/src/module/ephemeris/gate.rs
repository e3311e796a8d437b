//! Cache gate: the single cached batch and the rules for refreshing it
//!
//! The gate owns at most one batch. Only one acquisition cycle runs at a
//! time; callers arriving while a cycle is in flight wait for it and reuse
//! its outcome. A new batch is committed only once its cycle has completed,
//! so a dropped request future leaves the cache untouched.

use astrotrack_common::PositionBatch;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

use super::aggregator::{BatchAcquirer, TotalFailure, is_selected};
use super::client::EphemerisSource;
use super::error::AcquireError;
use super::registry::Registry;
use super::request::QueryInstant;

/// Shorter than the renderer's ~60s poll so a fresh batch is ready for each poll
pub const DEFAULT_TTL_SECONDS: u64 = 55;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    pub ttl: Duration,
    pub include_auxiliary: bool,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            include_auxiliary: true,
        }
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    batch: Option<Arc<PositionBatch>>,
    captured_at: Option<Instant>,
    /// Outcome of the most recent cycle when it produced nothing
    last_failure: Option<AcquireError>,
}

impl CacheEntry {
    fn fresh(&self, ttl: Duration) -> Option<&PositionBatch> {
        match (&self.batch, self.captured_at) {
            (Some(batch), Some(at)) if at.elapsed() < ttl => Some(batch.as_ref()),
            _ => None,
        }
    }

    /// What the most recent cycle left for callers.
    fn last_outcome(&self) -> Result<PositionBatch, AcquireError> {
        match (&self.batch, &self.last_failure) {
            (Some(batch), None) => Ok(batch.as_ref().clone()),
            (Some(batch), Some(error)) => Ok(stale_copy(batch, error)),
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Err(AcquireError::NoData {
                attempted: 0,
                last_error: "no acquisition has completed yet".to_string(),
            }),
        }
    }
}

fn stale_copy(batch: &PositionBatch, error: &AcquireError) -> PositionBatch {
    batch.to_stale(format!(
        "Refresh failed, serving positions from {}: {}",
        batch.timestamp_utc, error
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Populated,
    Refreshing,
}

/// Point-in-time view of the gate for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
    pub ttl_secs: u64,
    pub bodies: usize,
    pub failed: usize,
    pub cycles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct CacheGate<S: ?Sized> {
    acquirer: BatchAcquirer<S>,
    registry: Registry,
    settings: GateSettings,
    entry: Mutex<CacheEntry>,
    /// Completed cycles; only written while `entry` is locked
    cycles: AtomicU64,
}

impl<S: EphemerisSource + ?Sized> CacheGate<S> {
    pub fn new(acquirer: BatchAcquirer<S>, registry: Registry, settings: GateSettings) -> Self {
        Self {
            acquirer,
            registry,
            settings,
            entry: Mutex::new(CacheEntry::default()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// Bodies queried by each cycle under the current settings
    pub fn selected_len(&self) -> usize {
        self.registry
            .bodies()
            .iter()
            .filter(|b| is_selected(b, self.settings.include_auxiliary))
            .count()
    }

    /// Current positions.
    ///
    /// Serves the cached batch while it is younger than the TTL unless
    /// `force_refresh` is set. A refresh that yields no sample falls back to
    /// the previous batch marked stale; with nothing cached it is a hard
    /// failure.
    pub async fn request(&self, force_refresh: bool) -> Result<PositionBatch, AcquireError> {
        let seen = self.cycles.load(Ordering::Acquire);
        let mut entry = self.entry.lock().await;

        if self.cycles.load(Ordering::Acquire) != seen {
            tracing::debug!("Reusing outcome of the acquisition cycle that finished while waiting");
            return entry.last_outcome();
        }

        if !force_refresh {
            if let Some(batch) = entry.fresh(self.settings.ttl) {
                tracing::debug!("Serving cached batch from {}", batch.timestamp_utc);
                return Ok(batch.clone());
            }
        }

        let instant = QueryInstant::now();
        let cycle_id = uuid::Uuid::now_v7();
        let span = tracing::info_span!("cycle", id = %cycle_id);
        let outcome = self
            .acquirer
            .acquire_batch(self.registry.bodies(), &instant, self.settings.include_auxiliary)
            .instrument(span)
            .await;

        let result = match outcome {
            Ok(batch) => {
                let batch = Arc::new(batch);
                entry.batch = Some(batch.clone());
                entry.captured_at = Some(Instant::now());
                entry.last_failure = None;
                Ok(batch.as_ref().clone())
            }
            Err(total) => {
                let error = hard_failure(&total);
                entry.last_failure = Some(error.clone());
                match &entry.batch {
                    Some(previous) => {
                        tracing::warn!(
                            "Cycle {} produced no positions, serving stale batch from {}",
                            cycle_id,
                            previous.timestamp_utc
                        );
                        Ok(stale_copy(previous, &error))
                    }
                    None => {
                        tracing::error!("Cycle {} produced no positions and nothing is cached", cycle_id);
                        Err(error)
                    }
                }
            }
        };

        self.cycles.fetch_add(1, Ordering::AcqRel);
        result
    }

    pub fn status(&self) -> CacheStatus {
        let ttl_secs = self.settings.ttl.as_secs();
        let cycles = self.cycles.load(Ordering::Acquire);

        let Ok(entry) = self.entry.try_lock() else {
            return CacheStatus {
                state: CacheState::Refreshing,
                timestamp_utc: None,
                age_secs: None,
                ttl_secs,
                bodies: 0,
                failed: 0,
                cycles,
                last_error: None,
            };
        };

        let last_error = entry.last_failure.as_ref().map(ToString::to_string);
        match (&entry.batch, entry.captured_at) {
            (Some(batch), Some(at)) => CacheStatus {
                state: CacheState::Populated,
                timestamp_utc: Some(batch.timestamp_utc.clone()),
                age_secs: Some(at.elapsed().as_secs()),
                ttl_secs,
                bodies: batch.bodies.len(),
                failed: batch.failed.len(),
                cycles,
                last_error,
            },
            _ => CacheStatus {
                state: CacheState::Empty,
                timestamp_utc: None,
                age_secs: None,
                ttl_secs,
                bodies: 0,
                failed: 0,
                cycles,
                last_error,
            },
        }
    }
}

fn hard_failure(total: &TotalFailure) -> AcquireError {
    AcquireError::NoData {
        attempted: total.failures.len(),
        last_error: total.last_error(),
    }
}
