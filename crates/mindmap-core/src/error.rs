use std::fmt;

/// Machine-readable error codes for callers that map failures onto their own
/// status space (HTTP, CLI exit codes, agent decisions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    NotFound,
    InvalidReference,
    InvalidOperation,
    DataIntegrity,
    Serialization,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::InvalidReference => "E2002",
            Self::InvalidOperation => "E2003",
            Self::DataIntegrity => "E3001",
            Self::Serialization => "E3002",
            Self::StorageFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Entity not found",
            Self::InvalidReference => "Entity belongs to another document",
            Self::InvalidOperation => "Operation not allowed",
            Self::DataIntegrity => "Corrupted tree data",
            Self::Serialization => "Unparsable snapshot payload",
            Self::StorageFailure => "Storage failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in mindmap.toml and retry."),
            Self::NotFound => None,
            Self::InvalidReference => {
                Some("Pass ids that belong to the document named in the request.")
            }
            Self::InvalidOperation => {
                Some("Pick a target outside the moved subtree, or keep the latest version.")
            }
            Self::DataIntegrity => {
                Some("Run `mm check` on the document and repair its parent links.")
            }
            Self::Serialization => Some("The stored snapshot is corrupt; diff another version."),
            Self::StorageFailure => Some("Retry once. If persistent, check disk space and locks."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure the library can report.
///
/// Mutations that fail roll back their transaction, so an `Err` from a
/// mutating call never leaves a partial write behind.
#[derive(Debug, thiserror::Error)]
pub enum MindmapError {
    /// A referenced document, node, version or operation does not exist (or
    /// is logically deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The entity exists but belongs to a different document than asserted.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The request is well-formed but would break a tree or version rule.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Stored parent links are corrupt (cycle or runaway ancestor chain).
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// A snapshot or payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl MindmapError {
    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidReference(_) => ErrorCode::InvalidReference,
            Self::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Self::DataIntegrity(_) => ErrorCode::DataIntegrity,
            Self::Serialization(_) => ErrorCode::Serialization,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Database(_) => ErrorCode::StorageFailure,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Library-wide result alias.
pub type Result<T, E = MindmapError> = std::result::Result<T, E>;
