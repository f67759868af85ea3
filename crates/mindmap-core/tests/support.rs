//! Shared fixtures for the integration tests. Included by the other test
//! files through `#[path = "support.rs"] mod support;`.
#![allow(dead_code)]

use mindmap_core::MindMap;
use mindmap_core::model::{DocumentId, NewDocument, Node, NodeFields, NodeId};
use mindmap_core::tree::EditContext;
use mindmap_core::version::SnapshotNode;

pub const USER: i64 = 7;

pub fn ctx() -> EditContext {
    EditContext::user(USER)
}

/// A document with root R and children A, B (in that order).
pub struct Fixture {
    pub mm: MindMap,
    pub doc: DocumentId,
    pub root: NodeId,
    pub a: NodeId,
    pub b: NodeId,
}

pub fn fixture() -> Fixture {
    let mm = MindMap::in_memory().expect("open in-memory store");
    let (doc, root) = mm
        .create_document(&ctx(), &NewDocument::titled("R"))
        .expect("create document");
    let a = add(&mm, doc.id, root.id, "A").id;
    let b = add(&mm, doc.id, root.id, "B").id;
    Fixture {
        mm,
        doc: doc.id,
        root: root.id,
        a,
        b,
    }
}

pub fn add(mm: &MindMap, doc: DocumentId, parent: NodeId, content: &str) -> Node {
    mm.tree()
        .create_node(&ctx(), doc, Some(parent), &NodeFields::with_content(content))
        .expect("create node")
}

pub fn children(mm: &MindMap, parent: NodeId) -> Vec<NodeId> {
    mm.tree().get_node(parent).expect("get node").children_order
}

/// Id-free shape of a snapshot tree: contents and child lists, pre-order.
pub fn shape(node: &SnapshotNode) -> Vec<(String, i64, usize)> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        out.push((n.content.clone(), n.depth, n.children.len()));
        stack.extend(n.children.iter().rev());
    }
    out
}
