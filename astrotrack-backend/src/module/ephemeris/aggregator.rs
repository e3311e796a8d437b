//! Batch acquisition across the registry
//!
//! Bodies are fetched in registry order under a [`Pacing`] policy. Results
//! are partitioned into samples and failures without reordering. A cycle that
//! produces no sample at all is reported as [`TotalFailure`] instead of an
//! empty batch.

use astrotrack_common::{AcquisitionFailure, BodyKind, PositionBatch};
use futures::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::client::EphemerisSource;
use super::fetcher::{BodyResult, Fetcher, random_duration};
use super::registry::BodySpec;
use super::request::QueryInstant;

const MIN_GAP_MS: u64 = 150;
const MAX_GAP_MS: u64 = 450;

/// How requests for different bodies are spread over time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pacing {
    /// One body at a time, with a random pause in `[min_gap, max_gap]` between bodies
    Sequential { min_gap: Duration, max_gap: Duration },
    /// Up to `workers` bodies in flight. Each worker pauses between its own
    /// bodies, and consecutive starts are at least one random pause apart.
    Bounded {
        workers: usize,
        min_gap: Duration,
        max_gap: Duration,
    },
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Sequential {
            min_gap: Duration::from_millis(MIN_GAP_MS),
            max_gap: Duration::from_millis(MAX_GAP_MS),
        }
    }
}

impl Pacing {
    fn gap(&self) -> Duration {
        let (min, max) = match self {
            Pacing::Sequential { min_gap, max_gap } => (*min_gap, *max_gap),
            Pacing::Bounded { min_gap, max_gap, .. } => (*min_gap, *max_gap),
        };
        random_duration(min, max)
    }

    fn workers(&self) -> usize {
        match self {
            Pacing::Sequential { .. } => 1,
            Pacing::Bounded { workers, .. } => (*workers).max(1),
        }
    }
}

/// Every body of a cycle failed.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalFailure {
    pub timestamp_utc: String,
    pub failures: Vec<AcquisitionFailure>,
}

impl TotalFailure {
    pub fn last_error(&self) -> String {
        self.failures
            .last()
            .map(|f| format!("{}: {}", f.name, f.error))
            .unwrap_or_else(|| "no bodies were queried".to_string())
    }
}

/// Whether `body` takes part in a cycle
pub(crate) fn is_selected(body: &BodySpec, include_auxiliary: bool) -> bool {
    include_auxiliary || body.kind != BodyKind::Auxiliary
}

pub struct BatchAcquirer<S: ?Sized> {
    fetcher: Fetcher<S>,
    pacing: Pacing,
}

impl<S: EphemerisSource + ?Sized> BatchAcquirer<S> {
    pub fn new(fetcher: Fetcher<S>, pacing: Pacing) -> Self {
        Self { fetcher, pacing }
    }

    /// Acquire every selected body at `instant`.
    pub async fn acquire_batch(
        &self,
        bodies: &[BodySpec],
        instant: &QueryInstant,
        include_auxiliary: bool,
    ) -> Result<PositionBatch, TotalFailure> {
        let selected: Vec<&BodySpec> = bodies
            .iter()
            .filter(|b| is_selected(b, include_auxiliary))
            .collect();

        tracing::info!(
            "Acquiring {} bodies at {} ({:?})",
            selected.len(),
            instant,
            self.pacing
        );

        let results = self.run(&selected, instant).await;

        let mut samples = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(sample) => samples.push(sample),
                Err(failure) => failures.push(failure),
            }
        }

        tracing::info!(
            "Acquisition at {} finished: {}/{} bodies acquired, {} failed",
            instant,
            samples.len(),
            selected.len(),
            failures.len()
        );

        if samples.is_empty() {
            return Err(TotalFailure {
                timestamp_utc: instant.to_string(),
                failures,
            });
        }

        Ok(PositionBatch::new(instant.as_str(), samples, failures))
    }

    /// Results in the same order as `bodies`
    async fn run(&self, bodies: &[&BodySpec], instant: &QueryInstant) -> Vec<BodyResult> {
        match self.pacing {
            Pacing::Sequential { .. } => {
                let mut results = Vec::with_capacity(bodies.len());
                for (index, body) in bodies.iter().enumerate() {
                    if index > 0 {
                        tokio::time::sleep(self.pacing.gap()).await;
                    }
                    results.push(self.fetcher.acquire(body, instant).await);
                }
                results
            }
            Pacing::Bounded { .. } => {
                let workers = self.pacing.workers().min(bodies.len());
                let next = AtomicUsize::new(0);
                let last_start = Mutex::new(None);

                let mut lanes = Vec::with_capacity(workers);
                for _ in 0..workers {
                    lanes.push(self.lane(bodies, instant, &next, &last_start));
                }

                let mut indexed: Vec<(usize, BodyResult)> =
                    future::join_all(lanes).await.into_iter().flatten().collect();
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, result)| result).collect()
            }
        }
    }

    /// One worker of a bounded cycle. It claims bodies in registry order and
    /// pauses a gap after each of its own fetches. Every start, across all
    /// workers, also waits for a gap after the previous start.
    async fn lane(
        &self,
        bodies: &[&BodySpec],
        instant: &QueryInstant,
        next: &AtomicUsize,
        last_start: &Mutex<Option<Instant>>,
    ) -> Vec<(usize, BodyResult)> {
        let mut results = Vec::new();
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(body) = bodies.get(index) else {
                break;
            };

            if !results.is_empty() {
                tokio::time::sleep(self.pacing.gap()).await;
            }

            {
                let mut last = last_start.lock().await;
                if let Some(previous) = *last {
                    let earliest = previous + self.pacing.gap();
                    if earliest > Instant::now() {
                        tokio::time::sleep_until(earliest).await;
                    }
                }
                *last = Some(Instant::now());
            }

            results.push((index, self.fetcher.acquire(body, instant).await));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ephemeris::error::FetchError;
    use crate::module::ephemeris::fetcher::RetryPolicy;
    use crate::module::ephemeris::registry::{Designator, Registry};
    use crate::module::ephemeris::testing::{ScriptedSource, vector_payload};
    use std::sync::Arc;

    fn instant() -> QueryInstant {
        use chrono::TimeZone;
        QueryInstant::new(chrono::Utc.with_ymd_and_hms(2025, 1, 5, 7, 3, 9).unwrap())
    }

    fn inner_planets() -> Vec<BodySpec> {
        vec![BodySpec::major(199, "Mercury"), BodySpec::major(299, "Venus")]
    }

    fn acquirer(source: Arc<ScriptedSource>, pacing: Pacing) -> BatchAcquirer<ScriptedSource> {
        BatchAcquirer::new(Fetcher::new(source, RetryPolicy::immediate(3)), pacing)
    }

    fn start_offsets(source: &ScriptedSource, started: tokio::time::Instant) -> Vec<Duration> {
        source.requests().iter().map(|r| r.started - started).collect()
    }

    fn millis(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    fn no_gap() -> Pacing {
        Pacing::Sequential {
            min_gap: Duration::ZERO,
            max_gap: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_all_bodies_succeed() {
        let source = Arc::new(ScriptedSource::new());
        source.push("199", Ok(vector_payload(0.31, -0.24, 0.05)));
        source.push("299", Ok(vector_payload(0.62, 0.41, -0.01)));

        let batch = acquirer(source.clone(), no_gap())
            .acquire_batch(&inner_planets(), &instant(), true)
            .await
            .unwrap();

        assert_eq!(batch.timestamp_utc, "2025-Jan-05 07:03:09");
        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.instant == batch.timestamp_utc));
        assert_eq!(batch.center, "Sun");
        assert_eq!(batch.bodies.len(), 2);
        assert!(batch.failed.is_empty());
        assert!(!batch.stale);
        let mercury = batch.find_body("Mercury").unwrap();
        assert_eq!((mercury.x, mercury.y, mercury.z), (0.31, -0.24, 0.05));
        let venus = batch.find_body("Venus").unwrap();
        assert_eq!((venus.x, venus.y, venus.z), (0.62, 0.41, -0.01));
    }

    #[tokio::test]
    async fn test_partial_failure_is_servable() {
        let source = Arc::new(ScriptedSource::new());
        source.push("199", Ok(vector_payload(0.31, -0.24, 0.05)));
        source.push_n("299", Err(FetchError::Status(500)), 3);

        let batch = acquirer(source.clone(), no_gap())
            .acquire_batch(&inner_planets(), &instant(), true)
            .await
            .unwrap();

        assert_eq!(batch.bodies.len(), 1);
        assert_eq!(batch.bodies[0].name, "Mercury");
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].name, "Venus");
        assert_eq!(batch.failed[0].error, "HTTP error 500");
        assert!(batch.find_body("Venus").is_none());
        assert_eq!(source.calls("299"), 3);
    }

    #[tokio::test]
    async fn test_all_fail_is_total_failure() {
        let source = Arc::new(ScriptedSource::new());

        let failure = acquirer(source, no_gap())
            .acquire_batch(&inner_planets(), &instant(), true)
            .await
            .unwrap_err();

        assert_eq!(failure.timestamp_utc, "2025-Jan-05 07:03:09");
        let names: Vec<&str> = failure.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Mercury", "Venus"]);
        assert!(failure.last_error().starts_with("Venus: "));
    }

    #[tokio::test]
    async fn test_order_mirrors_registry() {
        let source = Arc::new(ScriptedSource::new());
        let registry = Registry::major();
        for (i, body) in registry.bodies().iter().enumerate() {
            if i % 3 == 1 {
                continue;
            }
            source.push(&body.designator.command(), Ok(vector_payload(i as f64, 0.0, 0.0)));
        }

        let batch = acquirer(source, no_gap())
            .acquire_batch(registry.bodies(), &instant(), true)
            .await
            .unwrap();

        let ok: Vec<&str> = batch.bodies.iter().map(|b| b.name.as_str()).collect();
        let failed: Vec<&str> = batch.failed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(ok, vec!["Mercury", "Earth", "Mars", "Saturn", "Uranus", "Pluto"]);
        assert_eq!(failed, vec!["Venus", "Jupiter", "Neptune"]);
    }

    #[tokio::test]
    async fn test_auxiliary_excluded() {
        let source = Arc::new(ScriptedSource::new());
        source.push("199", Ok(vector_payload(0.31, -0.24, 0.05)));
        source.push("Ceres;", Ok(vector_payload(1.0, 2.0, 3.0)));
        let bodies = vec![
            BodySpec::major(199, "Mercury"),
            BodySpec::auxiliary(Designator::Name("Ceres;".to_string()), "Ceres"),
        ];
        let acquirer = acquirer(source.clone(), no_gap());

        let batch = acquirer.acquire_batch(&bodies, &instant(), false).await.unwrap();
        assert_eq!(batch.bodies.len(), 1);
        assert_eq!(source.calls("Ceres;"), 0);

        source.push("199", Ok(vector_payload(0.31, -0.24, 0.05)));
        let batch = acquirer.acquire_batch(&bodies, &instant(), true).await.unwrap();
        assert_eq!(batch.bodies.len(), 2);
        assert_eq!(batch.bodies[1].id, None);
        assert_eq!(batch.bodies[1].kind, BodyKind::Auxiliary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_gap_between_bodies() {
        let source = Arc::new(ScriptedSource::new());
        source.push("199", Ok(vector_payload(0.31, -0.24, 0.05)));
        source.push("299", Ok(vector_payload(0.62, 0.41, -0.01)));
        let pacing = Pacing::Sequential {
            min_gap: Duration::from_millis(300),
            max_gap: Duration::from_millis(300),
        };

        let started = tokio::time::Instant::now();
        acquirer(source, pacing)
            .acquire_batch(&inner_planets(), &instant(), true)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_pacing_keeps_order() {
        // Each fetch takes 1s; with two workers and a 100ms start spacing the
        // four bodies overlap pairwise.
        let source = Arc::new(ScriptedSource::new().with_latency(Duration::from_secs(1)));
        let bodies: Vec<BodySpec> = Registry::major().bodies()[..4].to_vec();
        for (i, body) in bodies.iter().enumerate() {
            source.push(&body.designator.command(), Ok(vector_payload(i as f64, 0.0, 0.0)));
        }
        let pacing = Pacing::Bounded {
            workers: 2,
            min_gap: Duration::from_millis(100),
            max_gap: Duration::from_millis(100),
        };

        let started = tokio::time::Instant::now();
        let batch = acquirer(source.clone(), pacing)
            .acquire_batch(&bodies, &instant(), true)
            .await
            .unwrap();

        let xs: Vec<f64> = batch.bodies.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(source.total_calls(), 4);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_instant_across_bodies() {
        let source = Arc::new(ScriptedSource::new().with_latency(Duration::from_millis(700)));
        let registry = Registry::major();
        for body in registry.bodies() {
            source.push(&body.designator.command(), Ok(vector_payload(1.0, 0.0, 0.0)));
        }
        let pacing = Pacing::Bounded {
            workers: 3,
            min_gap: Duration::from_millis(100),
            max_gap: Duration::from_millis(400),
        };

        let batch = acquirer(source.clone(), pacing)
            .acquire_batch(registry.bodies(), &QueryInstant::now(), true)
            .await
            .unwrap();

        let requests = source.requests();
        assert_eq!(requests.len(), registry.len());
        assert!(requests.iter().all(|r| r.instant == batch.timestamp_utc));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_starts_include_fetch_and_gap() {
        let source = Arc::new(ScriptedSource::new().with_latency(Duration::from_secs(1)));
        let bodies: Vec<BodySpec> = Registry::major().bodies()[..4].to_vec();
        for body in &bodies {
            source.push(&body.designator.command(), Ok(vector_payload(1.0, 0.0, 0.0)));
        }
        let pacing = Pacing::Sequential {
            min_gap: Duration::from_millis(300),
            max_gap: Duration::from_millis(300),
        };

        let started = tokio::time::Instant::now();
        acquirer(source.clone(), pacing)
            .acquire_batch(&bodies, &instant(), true)
            .await
            .unwrap();
        assert_eq!(start_offsets(&source, started), millis(&[0, 1300, 2600, 3900]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_single_worker_keeps_gap() {
        let source = Arc::new(ScriptedSource::new().with_latency(Duration::from_secs(1)));
        let bodies: Vec<BodySpec> = Registry::major().bodies()[..4].to_vec();
        for body in &bodies {
            source.push(&body.designator.command(), Ok(vector_payload(1.0, 0.0, 0.0)));
        }
        let pacing = Pacing::Bounded {
            workers: 1,
            min_gap: Duration::from_millis(300),
            max_gap: Duration::from_millis(300),
        };

        let started = tokio::time::Instant::now();
        acquirer(source.clone(), pacing)
            .acquire_batch(&bodies, &instant(), true)
            .await
            .unwrap();
        assert_eq!(start_offsets(&source, started), millis(&[0, 1300, 2600, 3900]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_workers_never_start_back_to_back() {
        let source = Arc::new(ScriptedSource::new().with_latency(Duration::from_secs(1)));
        let bodies: Vec<BodySpec> = Registry::major().bodies()[..4].to_vec();
        for body in &bodies {
            source.push(&body.designator.command(), Ok(vector_payload(1.0, 0.0, 0.0)));
        }
        let pacing = Pacing::Bounded {
            workers: 2,
            min_gap: Duration::from_millis(300),
            max_gap: Duration::from_millis(300),
        };

        let started = tokio::time::Instant::now();
        acquirer(source.clone(), pacing)
            .acquire_batch(&bodies, &instant(), true)
            .await
            .unwrap();

        // A freed worker still pauses after its own fetch
        assert_eq!(start_offsets(&source, started), millis(&[0, 300, 1300, 1600]));
        let commands: Vec<String> = source.requests().into_iter().map(|r| r.command).collect();
        assert_eq!(commands, vec!["199", "299", "399", "499"]);
    }
}
