//! In-memory ephemeris source for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::client::EphemerisSource;
use super::error::FetchError;
use super::request::VectorQuery;

/// A fetch as seen by the source
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub command: String,
    pub instant: String,
    pub started: tokio::time::Instant,
}

/// Answers each COMMAND from a queue of scripted responses.
/// An exhausted queue yields a transport error.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, command: &str, response: Result<String, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue the same response `times` times
    pub fn push_n(&self, command: &str, response: Result<String, FetchError>, times: usize) {
        for _ in 0..times {
            self.push(command, response.clone());
        }
    }

    pub fn calls(&self, command: &str) -> usize {
        self.calls.lock().unwrap().get(command).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Every fetch in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EphemerisSource for ScriptedSource {
    async fn fetch(&self, query: &VectorQuery) -> Result<String, FetchError> {
        *self.calls.lock().unwrap().entry(query.command.clone()).or_default() += 1;
        self.requests.lock().unwrap().push(RecordedRequest {
            command: query.command.clone(),
            instant: query.instant.clone(),
            started: tokio::time::Instant::now(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get_mut(&query.command)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(FetchError::Transport(format!("no scripted response for {}", query.command))))
    }
}

/// Horizons-style CSV result carrying one vector row
pub fn vector_payload(x: f64, y: f64, z: f64) -> String {
    format!(
        "API VERSION: 1.2\n*******\n$$SOE\n2460680.500000000, A.D. 2025-Jan-05 07:03:09.0000, {:?}, {:?}, {:?},\n$$EOE\n*******\n",
        x, y, z
    )
}
