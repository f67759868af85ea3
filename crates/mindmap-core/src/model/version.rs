use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DocumentId, VersionId};

/// How a version came to exist. Only autosaves are subject to retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    Autosave,
    Explicit,
}

impl VersionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Autosave => "autosave",
            Self::Explicit => "explicit",
        }
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autosave" | "auto" => Ok(Self::Autosave),
            "explicit" | "manual" => Ok(Self::Explicit),
            other => Err(format!(
                "unknown version type '{other}': expected autosave or explicit"
            )),
        }
    }
}

/// A stored snapshot of one document. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub document_id: DocumentId,
    pub version_number: i64,
    pub version_type: VersionType,
    pub name: String,
    pub description: Option<String>,
    /// Serialized [`crate::version::snapshot::Snapshot`].
    pub snapshot_data: String,
    pub node_count: i64,
    pub snapshot_size: i64,
    pub created_by: Option<i64>,
    pub created_at_us: i64,
}
