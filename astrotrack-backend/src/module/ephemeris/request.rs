//! Query instant formatting and per-body request parameters

use chrono::{DateTime, Utc};

use super::registry::BodySpec;

/// Calendar form accepted by the Horizons TLIST grammar, e.g. "2025-Jan-05 07:03:09"
pub const HORIZONS_TIME_FORMAT: &str = "%Y-%b-%d %H:%M:%S";

/// The nominal instant shared by every request of one acquisition cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInstant {
    text: String,
}

impl QueryInstant {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            text: at.format(HORIZONS_TIME_FORMAT).to_string(),
        }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for QueryInstant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// One body's vector-table request: heliocentric, ecliptic, AU, single epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorQuery {
    pub command: String,
    pub instant: String,
}

impl VectorQuery {
    pub fn new(body: &BodySpec, instant: &QueryInstant) -> Self {
        Self {
            command: body.designator.command(),
            instant: instant.as_str().to_string(),
        }
    }

    /// Ordered key/value pairs of the Horizons API call
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("format", "json".to_string()),
            ("COMMAND", quoted(&self.command)),
            ("OBJ_DATA", "NO".to_string()),
            ("MAKE_EPHEM", "YES".to_string()),
            ("EPHEM_TYPE", "VECTORS".to_string()),
            ("CENTER", quoted("500@10")),
            ("REF_PLANE", "ECLIPTIC".to_string()),
            ("REF_SYSTEM", "J2000".to_string()),
            ("OUT_UNITS", "AU-D".to_string()),
            ("VEC_TABLE", "1".to_string()),
            ("VEC_LABELS", "NO".to_string()),
            ("CSV_FORMAT", "YES".to_string()),
            ("TIME_TYPE", "UT".to_string()),
            ("TLIST", quoted(&self.instant)),
        ]
    }

    /// Full request URL with percent-encoded parameters
    pub fn url(&self, base_url: &str) -> String {
        let query = self
            .params()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(&value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", base_url, query)
    }
}

fn quoted(value: &str) -> String {
    format!("'{}'", value)
}
