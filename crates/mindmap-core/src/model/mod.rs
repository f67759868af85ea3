//! Domain types shared by every component.

pub mod node;
pub mod operation;
pub mod version;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use node::{Document, NewDocument, Node, NodeFields, NodePatch};
pub use operation::{NewOperation, OpType, Operation};
pub use version::{Version, VersionType};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Row id of a document.
    DocumentId
);
row_id!(
    /// Row id of a node. Ids are never reused; restores mint fresh ones.
    NodeId
);
row_id!(
    /// Row id of a stored version snapshot.
    VersionId
);

/// Current wall clock in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display() {
        let id: NodeId = " 42 ".parse().expect("parse id");
        assert_eq!(id, NodeId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<DocumentId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&VersionId(7)).expect("serialize");
        assert_eq!(json, "7");
        let back: VersionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, VersionId(7));
    }
}
