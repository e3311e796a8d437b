//! Per-body acquisition with bounded exponential backoff

use astrotrack_common::{AcquisitionFailure, PositionSample};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::client::EphemerisSource;
use super::error::FetchError;
use super::parser::parse_vector;
use super::registry::BodySpec;
use super::request::{QueryInstant, VectorQuery};

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 1_000;
const MAX_JITTER_MS: u64 = 250;
const ATTEMPT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one
    pub base_delay: Duration,
    /// Upper bound of the random delay added to each backoff
    pub max_jitter: Duration,
    /// Bound on a single attempt, including reading the body
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_jitter: Duration::from_millis(MAX_JITTER_MS),
            attempt_timeout: Duration::from_secs(ATTEMPT_TIMEOUT_SECONDS),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Deterministic part of the wait after `failed_attempt` (1-based)
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let doublings = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << doublings)
    }

    /// Backoff plus jitter in `[0, max_jitter]`
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.backoff(failed_attempt) + random_duration(Duration::ZERO, self.max_jitter)
    }
}

/// Uniform duration in `[min, max]`
pub(crate) fn random_duration(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// Outcome of one body's acquisition; never an unhandled error.
pub type BodyResult = Result<PositionSample, AcquisitionFailure>;

pub struct Fetcher<S: ?Sized> {
    source: Arc<S>,
    policy: RetryPolicy,
}

impl<S: EphemerisSource + ?Sized> Fetcher<S> {
    pub fn new(source: Arc<S>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Acquire one body's position, retrying every failure kind.
    pub async fn acquire(&self, body: &BodySpec, instant: &QueryInstant) -> BodyResult {
        let query = VectorQuery::new(body, instant);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_after(attempt - 1);
                tracing::debug!(
                    "Retrying {} after {:?} (attempt {}/{})",
                    body.display_name,
                    delay,
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&query).await {
                Ok(vector) => {
                    tracing::debug!(
                        "Acquired {} ({}): x={} y={} z={}",
                        body.display_name,
                        body.designator,
                        vector.x,
                        vector.y,
                        vector.z
                    );
                    return Ok(PositionSample {
                        name: body.display_name.clone(),
                        id: body.designator.id(),
                        kind: body.kind,
                        x: vector.x,
                        y: vector.y,
                        z: vector.z,
                    });
                }
                Err(e) => {
                    if attempt == max_attempts {
                        tracing::error!(
                            "Failed to acquire {} after {} attempts: {}",
                            body.display_name,
                            max_attempts,
                            e
                        );
                    } else {
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}",
                            attempt,
                            max_attempts,
                            body.display_name,
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(AcquisitionFailure {
            name: body.display_name.clone(),
            id: body.designator.id(),
            error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        })
    }

    /// Single fetch-and-parse attempt
    async fn attempt(&self, query: &VectorQuery) -> Result<super::parser::Vector3, FetchError> {
        let payload = tokio::time::timeout(self.policy.attempt_timeout, self.source.fetch(query))
            .await
            .map_err(|_| FetchError::Timeout(self.policy.attempt_timeout.as_secs()))??;
        Ok(parse_vector(&payload)?)
    }
}
