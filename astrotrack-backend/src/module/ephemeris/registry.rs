//! Body registry: the fixed major bodies plus configured auxiliary bodies

use astrotrack_common::BodyKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Planets Mercury through Neptune and the Pluto system barycenter,
/// as Horizons major-body ids.
pub const MAJOR_BODIES: &[(u32, &str)] = &[
    (199, "Mercury"),
    (299, "Venus"),
    (399, "Earth"),
    (499, "Mars"),
    (599, "Jupiter"),
    (699, "Saturn"),
    (799, "Uranus"),
    (899, "Neptune"),
    (9, "Pluto"),
];

/// How the upstream service identifies a body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Designator {
    Id(u32),
    /// Free text resolved by the upstream service, e.g. "Ceres;"
    Name(String),
}

impl Designator {
    pub fn id(&self) -> Option<u32> {
        match self {
            Designator::Id(id) => Some(*id),
            Designator::Name(_) => None,
        }
    }

    /// Value placed in the upstream COMMAND parameter
    pub fn command(&self) -> String {
        match self {
            Designator::Id(id) => id.to_string(),
            Designator::Name(name) => name.clone(),
        }
    }
}

impl std::fmt::Display for Designator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Designator::Id(id) => write!(f, "{}", id),
            Designator::Name(name) => write!(f, "'{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySpec {
    pub designator: Designator,
    pub display_name: String,
    pub kind: BodyKind,
}

impl BodySpec {
    pub fn major(id: u32, display_name: impl Into<String>) -> Self {
        Self {
            designator: Designator::Id(id),
            display_name: display_name.into(),
            kind: BodyKind::Major,
        }
    }

    pub fn auxiliary(designator: Designator, display_name: impl Into<String>) -> Self {
        Self {
            designator,
            display_name: display_name.into(),
            kind: BodyKind::Auxiliary,
        }
    }
}

/// Auxiliary body entry as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryBody {
    /// Display name
    pub name: String,

    /// Numeric designator; takes precedence over `designation`
    #[serde(default)]
    pub id: Option<u32>,

    /// Name the upstream service resolves; defaults to `name`
    #[serde(default)]
    pub designation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("auxiliary body #{0} has an empty name")]
    BlankName(usize),
}

impl TryFrom<&AuxiliaryBody> for BodySpec {
    type Error = RegistryError;

    fn try_from(entry: &AuxiliaryBody) -> Result<Self, Self::Error> {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(RegistryError::BlankName(0));
        }

        let designator = match (entry.id, entry.designation.as_deref().map(str::trim)) {
            (Some(id), _) => Designator::Id(id),
            (None, Some(designation)) if !designation.is_empty() => {
                Designator::Name(designation.to_string())
            }
            (None, _) => Designator::Name(name.to_string()),
        };

        Ok(BodySpec::auxiliary(designator, name))
    }
}

/// Ordered, immutable list of bodies queried every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    bodies: Vec<BodySpec>,
}

impl Registry {
    /// Major bodies only
    pub fn major() -> Self {
        Self {
            bodies: MAJOR_BODIES
                .iter()
                .map(|&(id, name)| BodySpec::major(id, name))
                .collect(),
        }
    }

    /// Major bodies followed by `auxiliary` in configuration order.
    /// Duplicate display names are kept.
    pub fn with_auxiliary(auxiliary: &[AuxiliaryBody]) -> Result<Self, RegistryError> {
        let mut registry = Self::major();
        for (index, entry) in auxiliary.iter().enumerate() {
            let spec = BodySpec::try_from(entry).map_err(|_| RegistryError::BlankName(index))?;
            registry.bodies.push(spec);
        }
        Ok(registry)
    }

    /// Arbitrary body list, used when the fixed list is not wanted.
    pub fn from_bodies(bodies: Vec<BodySpec>) -> Self {
        Self { bodies }
    }

    pub fn bodies(&self) -> &[BodySpec] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
