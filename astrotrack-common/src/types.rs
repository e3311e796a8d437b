use serde::{Deserialize, Serialize};

/// Coordinate origin of every batch.
pub const CENTER: &str = "Sun";
/// Reference plane of every batch.
pub const REF_PLANE: &str = "ECLIPTIC";
/// Distance unit of every stored coordinate.
pub const DISTANCE_UNIT: &str = "AU";

/// Which registry list a body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyKind {
    /// One of the fixed planets or the outer-system barycenter
    #[serde(rename = "major")]
    Major,
    /// A body supplied through configuration
    #[serde(rename = "auxiliary")]
    Auxiliary,
}

impl BodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyKind::Major => "major",
            BodyKind::Auxiliary => "auxiliary",
        }
    }
}

impl std::fmt::Display for BodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One successfully acquired position, Sun-centered ecliptic J2000, in AU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub name: String,
    /// Numeric designator; absent for bodies resolved by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(rename = "type")]
    pub kind: BodyKind,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A body whose every acquisition attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionFailure {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Diagnostic text only, never parsed downstream
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub distance: String,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            distance: DISTANCE_UNIT.to_string(),
        }
    }
}

/// One consistent set of positions captured at a single nominal instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBatch {
    /// Instant used for every query of the batch, e.g. "2025-Jan-05 07:03:09"
    pub timestamp_utc: String,
    pub center: String,
    pub ref_plane: String,
    pub units: Units,
    /// Successful samples, in registry order
    pub bodies: Vec<PositionSample>,
    /// Exhausted bodies, in registry order
    pub failed: Vec<AcquisitionFailure>,
    /// Set when serving a previous batch because a refresh produced nothing
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PositionBatch {
    pub fn new(
        timestamp_utc: impl Into<String>,
        bodies: Vec<PositionSample>,
        failed: Vec<AcquisitionFailure>,
    ) -> Self {
        Self {
            timestamp_utc: timestamp_utc.into(),
            center: CENTER.to_string(),
            ref_plane: REF_PLANE.to_string(),
            units: Units::default(),
            bodies,
            failed,
            stale: false,
            warnings: Vec::new(),
        }
    }

    /// Copy of this batch flagged as outdated, with `warning` appended.
    pub fn to_stale(&self, warning: impl Into<String>) -> Self {
        let mut batch = self.clone();
        batch.stale = true;
        batch.warnings.push(warning.into());
        batch
    }

    pub fn find_body(&self, name: &str) -> Option<&PositionSample> {
        self.bodies.iter().find(|b| b.name == name)
    }
}

/// Body of a service-unavailable response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}
