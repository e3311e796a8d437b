//! Scheduled task manager
//!
//! Keeps the position cache warm by running a non-forced gate request on a
//! fixed interval, so that readers rarely pay for an acquisition cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::ephemeris::{CacheGate, EphemerisSource};

/// Configuration for scheduled tasks
#[derive(Debug, Clone)]
pub struct ScheduledTaskConfig {
    /// Interval between cache warm-ups
    pub warm_interval: Duration,

    /// Warm the cache immediately on start
    pub perform_initial_update: bool,
}

impl Default for ScheduledTaskConfig {
    fn default() -> Self {
        Self {
            warm_interval: Duration::from_secs(300),
            perform_initial_update: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Stale,
    Failed,
}

/// Summary of one warm-up run
#[derive(Debug, Clone, PartialEq)]
pub struct WarmReport {
    pub timestamp_utc: Option<String>,
    pub successful: usize,
    pub total: usize,
    pub last_run_status: RunStatus,
}

pub struct ScheduledTaskManager {
    config: ScheduledTaskConfig,
    gate: Arc<CacheGate<dyn EphemerisSource>>,
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    pub fn new(config: ScheduledTaskConfig, gate: Arc<CacheGate<dyn EphemerisSource>>) -> Self {
        Self {
            config,
            gate,
            task_handles: Vec::new(),
        }
    }

    /// Start all scheduled tasks
    pub fn start_all(&mut self) {
        tracing::info!("Starting scheduled task manager...");

        let handle = self.start_warm_task();
        self.task_handles.push(handle);

        tracing::info!(
            "Started {} scheduled tasks (cache warm-up every {}s)",
            self.task_handles.len(),
            self.config.warm_interval.as_secs()
        );
    }

    fn start_warm_task(&self) -> JoinHandle<()> {
        let gate = self.gate.clone();
        let interval = self.config.warm_interval;
        let perform_initial = self.config.perform_initial_update;

        tracing::info!(
            "Scheduling cache warm-up task (interval: {}s, initial: {})",
            interval.as_secs(),
            perform_initial
        );

        tokio::spawn(async move {
            if perform_initial {
                tracing::info!("Performing initial cache warm-up...");
                Self::run_warm(&gate).await;
            }

            loop {
                tokio::time::sleep(interval).await;
                Self::run_warm(&gate).await;
            }
        })
    }

    /// One warm-up; a fresh cache is left untouched.
    async fn run_warm(gate: &CacheGate<dyn EphemerisSource>) -> WarmReport {
        let report = match gate.request(false).await {
            Ok(batch) => WarmReport {
                successful: batch.bodies.len(),
                total: batch.bodies.len() + batch.failed.len(),
                last_run_status: if batch.stale { RunStatus::Stale } else { RunStatus::Success },
                timestamp_utc: Some(batch.timestamp_utc),
            },
            Err(e) => {
                tracing::error!("Cache warm-up failed: {}", e);
                WarmReport {
                    timestamp_utc: None,
                    successful: 0,
                    total: gate.selected_len(),
                    last_run_status: RunStatus::Failed,
                }
            }
        };

        tracing::info!(
            "Cache warm-up: {}/{} successful, last_run_status={:?}",
            report.successful,
            report.total,
            report.last_run_status
        );
        report
    }

    /// Gracefully shutdown all tasks
    pub fn shutdown(self) {
        tracing::info!("Shutting down scheduled task manager...");

        for handle in self.task_handles {
            handle.abort();
        }

        tracing::info!("All scheduled tasks stopped");
    }
}
