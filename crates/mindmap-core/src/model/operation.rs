//! Edit-log record types.
//!
//! The string form of each [`OpType`] is what lands in the `op_type` column
//! and what collaborating clients submit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DocumentId, NodeId};

/// Kinds of edits recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// A node was created.
    Create,
    /// Non-structural fields of one node changed.
    Update,
    /// The same field update was applied to several nodes.
    BatchUpdate,
    /// A node changed parent or position.
    Move,
    /// A parent's children were reordered.
    Reorder,
    /// A subtree was logically deleted.
    Delete,
    /// A node's collapsed flag was toggled.
    Collapse,
    /// The live tree was replaced from a version snapshot.
    Restore,
}

/// Error returned when parsing an unknown operation type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOpType {
    pub raw: String,
}

impl fmt::Display for UnknownOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown op type '{}': expected one of create, update, batch_update, \
             move, reorder, delete, collapse, restore",
            self.raw
        )
    }
}

impl std::error::Error for UnknownOpType {}

impl OpType {
    pub const ALL: [Self; 8] = [
        Self::Create,
        Self::Update,
        Self::BatchUpdate,
        Self::Move,
        Self::Reorder,
        Self::Delete,
        Self::Collapse,
        Self::Restore,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::BatchUpdate => "batch_update",
            Self::Move => "move",
            Self::Reorder => "reorder",
            Self::Delete => "delete",
            Self::Collapse => "collapse",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = UnknownOpType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownOpType { raw: s.to_string() })
    }
}

/// A stored, immutable edit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: i64,
    pub op_id: String,
    pub document_id: DocumentId,
    pub node_id: Option<NodeId>,
    pub op_type: OpType,
    pub payload: serde_json::Value,
    pub user_id: i64,
    pub causality_ts: i64,
    pub created_at_us: i64,
}

/// An edit submitted for recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    /// Client idempotency key.
    pub op_id: String,
    pub document_id: DocumentId,
    pub op_type: OpType,
    pub node_id: Option<NodeId>,
    pub payload: serde_json::Value,
    pub user_id: i64,
    /// Logical ordering key; wall clock when absent.
    pub causality_ts: Option<i64>,
}
