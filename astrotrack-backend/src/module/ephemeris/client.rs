//! Horizons API client

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::error::FetchError;
use super::request::VectorQuery;

pub const HORIZONS_API_URL: &str = "https://ssd.jpl.nasa.gov/api/horizons.api";
const DEFAULT_USER_AGENT: &str = "AstroTrack/0.1";

/// Anything that can answer a vector query with the raw result text.
#[async_trait]
pub trait EphemerisSource: Send + Sync {
    async fn fetch(&self, query: &VectorQuery) -> Result<String, FetchError>;
}

/// JSON envelope returned with `format=json`
#[derive(Debug, Deserialize)]
struct HorizonsEnvelope {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Pull the result text out of a response body.
///
/// A JSON envelope must carry `result` and no `error`; a body that is not
/// JSON at all is taken to be the plain-text result.
pub fn extract_result(body: &str) -> Result<String, FetchError> {
    match serde_json::from_str::<HorizonsEnvelope>(body) {
        Ok(HorizonsEnvelope { error: Some(error), .. }) => Err(FetchError::Upstream(error.trim().to_string())),
        Ok(HorizonsEnvelope { result: Some(result), .. }) => Ok(result),
        Ok(_) => Err(FetchError::Upstream("response carried neither result nor error".to_string())),
        Err(_) => Ok(body.to_string()),
    }
}

pub struct HorizonsClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HorizonsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: Option<&str>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl EphemerisSource for HorizonsClient {
    async fn fetch(&self, query: &VectorQuery) -> Result<String, FetchError> {
        let url = query.url(&self.base_url);
        tracing::trace!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;
        extract_result(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ephemeris::registry::BodySpec;
    use crate::module::ephemeris::request::QueryInstant;

    #[test]
    fn test_extract_result_envelope() {
        let body = r#"{"signature":{"version":"1.2"},"result":"$$SOE\n1,2,3\n$$EOE"}"#;
        assert_eq!(extract_result(body).unwrap(), "$$SOE\n1,2,3\n$$EOE");
    }

    #[test]
    fn test_extract_result_error_field() {
        let body = r#"{"error":"Cannot interpret date. Type \"?!\" for help.\n"}"#;
        assert_eq!(
            extract_result(body),
            Err(FetchError::Upstream("Cannot interpret date. Type \"?!\" for help.".to_string()))
        );
    }

    #[test]
    fn test_extract_result_plain_text() {
        let body = "API VERSION: 1.2\n$$SOE\n1,2,3\n$$EOE\n";
        assert_eq!(extract_result(body).unwrap(), body);
    }

    #[test]
    fn test_extract_result_empty_envelope() {
        assert!(matches!(extract_result("{}"), Err(FetchError::Upstream(_))));
    }

    #[tokio::test]
    #[ignore] // Requires network connection
    async fn test_fetch_live_mars() {
        let client = HorizonsClient::new(HORIZONS_API_URL, Duration::from_secs(30), None).unwrap();
        let query = VectorQuery::new(&BodySpec::major(499, "Mars"), &QueryInstant::now());
        let payload = client.fetch(&query).await.unwrap();
        assert!(crate::module::ephemeris::parser::parse_vector(&payload).is_ok());
    }
}
