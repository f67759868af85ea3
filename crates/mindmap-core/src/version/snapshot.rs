//! Self-contained, serialized image of a document's live tree.
//!
//! Layout:
//!
//! ```json
//! {"document": {"id": 1, "title": "...", "theme": "...", "visibility": "..."},
//!  "nodes": {"id": 2, "content": "...", ..., "children": [...]},
//!  "nodeCount": 12,
//!  "snapshotTime": "2025-01-01T00:00:00+00:00"}
//! ```
//!
//! `nodes` is `null` (or `[]`) for a document without a live root. Building
//! and flattening are iterative. Only serde's own deserialization recurses:
//! nesting is capped by [`nesting_limit`] before parsing, and the parse runs
//! on a stack sized for that cap.

use rusqlite::Connection;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use crate::config::Config;
use crate::db::{documents, nodes};
use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, Node, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub document: SnapshotDocument,
    #[serde(default, deserialize_with = "tree_or_empty")]
    pub nodes: Option<SnapshotNode>,
    pub node_count: usize,
    pub snapshot_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: DocumentId,
    pub title: String,
    pub theme: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: NodeId,
    pub content: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub labels: Option<String>,
    #[serde(default)]
    pub collapsed: bool,
    pub position: Option<String>,
    pub depth: i64,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    fn leaf(node: &Node) -> Self {
        Self {
            id: node.id,
            content: node.content.clone(),
            color: node.color.clone(),
            icon: node.icon.clone(),
            description: node.description.clone(),
            labels: node.labels.clone(),
            collapsed: node.collapsed,
            position: node.position.clone(),
            depth: node.depth,
            children: Vec::new(),
        }
    }
}

/// One node of a flattened snapshot, keyed by id in [`Snapshot::flatten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub parent_id: Option<NodeId>,
    pub content: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub depth: i64,
}

/// Empty trees are stored as `null`; older writers used `[]`.
fn tree_or_empty<'de, D>(deserializer: D) -> std::result::Result<Option<SnapshotNode>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TreeOrEmpty;

    impl<'de> Visitor<'de> for TreeOrEmpty {
        type Value = Option<SnapshotNode>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a tree node, null, or an empty array")
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(
            self,
            deserializer: D2,
        ) -> std::result::Result<Self::Value, D2::Error> {
            deserializer.deserialize_any(self)
        }

        fn visit_seq<A: SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            if seq.next_element::<de::IgnoredAny>()?.is_some() {
                return Err(de::Error::invalid_length(1, &self));
            }
            Ok(None)
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            map: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            SnapshotNode::deserialize(de::value::MapAccessDeserializer::new(map)).map(Some)
        }
    }

    deserializer.deserialize_any(TreeOrEmpty)
}

/// Stack reserved per permitted JSON nesting level while parsing.
const STACK_PER_LEVEL: usize = 32 * 1024;

/// Stack reserved on top of the per-level budget.
const STACK_BASE: usize = 1024 * 1024;

/// Deepest JSON nesting a snapshot may have under `config`.
///
/// Each tree level adds a node object and its `children` array; the
/// envelope and slack cover the rest.
#[must_use]
pub const fn nesting_limit(config: &Config) -> usize {
    config
        .tree
        .max_ancestor_hops
        .saturating_add(1)
        .saturating_mul(2)
        .saturating_add(8)
}

/// Whether `data` nests objects/arrays deeper than `limit`, scanning
/// bytes without recursion.
fn nests_deeper_than(data: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for byte in data.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

impl Snapshot {
    /// Parse stored snapshot text, allowing trees as deep as `config`
    /// permits.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Serialization`] for anything that is not a
    /// well-formed snapshot, including input nested past
    /// [`nesting_limit`].
    pub fn parse(data: &str, config: &Config) -> Result<Self> {
        let limit = nesting_limit(config);
        if nests_deeper_than(data, limit) {
            return Err(MindmapError::Serialization(serde::de::Error::custom(format!(
                "snapshot nests deeper than {limit} levels"
            ))));
        }
        let stack = STACK_BASE.saturating_add(limit.saturating_mul(STACK_PER_LEVEL));
        stacker::grow(stack, || -> Result<Self> {
            let mut de = serde_json::Deserializer::from_str(data);
            de.disable_recursion_limit();
            let snapshot = Self::deserialize(&mut de)?;
            de.end()?;
            Ok(snapshot)
        })
    }

    /// # Errors
    ///
    /// Returns [`MindmapError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Every node keyed by id, with its parent link.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::DataIntegrity`] if a node id appears twice.
    pub fn flatten(&self) -> Result<BTreeMap<NodeId, FlatNode>> {
        let mut flat = BTreeMap::new();
        let mut stack: Vec<(&SnapshotNode, Option<NodeId>)> =
            self.nodes.iter().map(|root| (root, None)).collect();
        while let Some((node, parent_id)) = stack.pop() {
            let entry = FlatNode {
                parent_id,
                content: node.content.clone(),
                color: node.color.clone(),
                icon: node.icon.clone(),
                depth: node.depth,
            };
            if flat.insert(node.id, entry).is_some() {
                return Err(MindmapError::DataIntegrity(format!(
                    "snapshot lists node {} more than once",
                    node.id
                )));
            }
            stack.extend(node.children.iter().map(|child| (child, Some(node.id))));
        }
        Ok(flat)
    }
}

/// Capture the live tree of a document.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] for a missing document and
/// [`MindmapError::DataIntegrity`] when live nodes are not all reachable
/// from a single root.
pub fn capture(conn: &Connection, document_id: DocumentId) -> Result<Snapshot> {
    let doc = documents::require(conn, document_id)?;
    let all = nodes::find_all_in_document(conn, document_id)?;
    let node_count = all.len();
    let tree = build_tree(&all)?;

    Ok(Snapshot {
        document: SnapshotDocument {
            id: doc.id,
            title: doc.title,
            theme: doc.theme,
            visibility: doc.visibility,
        },
        nodes: tree,
        node_count,
        snapshot_time: chrono::Utc::now().to_rfc3339(),
    })
}

/// Nest flat nodes under their root, bottom-up, without recursion.
fn build_tree(all: &[Node]) -> Result<Option<SnapshotNode>> {
    let mut roots = all.iter().filter(|n| n.is_root());
    let Some(root) = roots.next() else {
        if all.is_empty() {
            return Ok(None);
        }
        return Err(MindmapError::DataIntegrity(
            "live nodes exist but none is a root".to_string(),
        ));
    };
    if let Some(extra) = roots.next() {
        return Err(MindmapError::DataIntegrity(format!(
            "document has two live roots: {} and {}",
            root.id, extra.id
        )));
    }

    let root_id = root.id;
    let by_id: HashMap<NodeId, &Node> = all.iter().map(|n| (n.id, n)).collect();
    let mut order = Vec::with_capacity(all.len());
    let mut seen = HashSet::from([root_id]);
    let mut queue = VecDeque::from([root_id]);
    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let Some(node) = by_id.get(&id) {
            for &child in &node.children_order {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }
    if order.len() != all.len() {
        return Err(MindmapError::DataIntegrity(format!(
            "{} live nodes are unreachable from root {root_id}",
            all.len() - order.len()
        )));
    }

    let mut built: HashMap<NodeId, SnapshotNode> = HashMap::with_capacity(order.len());
    for id in order.into_iter().rev() {
        let Some(node) = by_id.get(&id) else {
            continue;
        };
        let mut snap = SnapshotNode::leaf(node);
        snap.children = node
            .children_order
            .iter()
            .filter_map(|child| built.remove(child))
            .collect();
        built.insert(id, snap);
    }
    built
        .remove(&root_id)
        .map(Some)
        .ok_or_else(|| MindmapError::DataIntegrity(format!("root {root_id} was not rebuilt")))
}
