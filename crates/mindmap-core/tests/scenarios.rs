//! End-to-end behavior of the mind-map store through the `MindMap` facade.
//!
//! Covers the reference scenarios (move, cycle rejection, idempotent log,
//! autosave retention, moved-and-updated diff) plus restore, chunk bounds
//! and live-tree diffs.

use mindmap_core::chunk::ChunkKind;
use mindmap_core::diff::ChangeType;
use mindmap_core::error::{ErrorCode, MindmapError};
use mindmap_core::model::{NewOperation, NodeFields, NodePatch, OpType, VersionType};
use mindmap_core::version::VersionOptions;
use mindmap_core::version::snapshot;
use serde_json::json;

#[path = "support.rs"]
mod support;
use support::*;

// ---------------------------------------------------------------------------
// Tree mutation
// ---------------------------------------------------------------------------

#[test]
fn move_into_sibling_updates_orders_and_depth() {
    let f = fixture();
    let moved = f
        .mm
        .tree()
        .move_node(&ctx(), f.b, Some(f.a), Some(0))
        .expect("move B under A");

    assert_eq!(children(&f.mm, f.root), vec![f.a]);
    assert_eq!(children(&f.mm, f.a), vec![f.b]);
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.parent_id, Some(f.a));
}

#[test]
fn moving_under_own_descendant_is_rejected_without_changes() {
    let f = fixture();
    f.mm.tree()
        .move_node(&ctx(), f.b, Some(f.a), Some(0))
        .expect("move B under A");
    let before = snapshot::capture(f.mm.connection(), f.doc).expect("capture");

    let err = f
        .mm
        .tree()
        .move_node(&ctx(), f.a, Some(f.b), None)
        .expect_err("cycle");
    assert!(matches!(err, MindmapError::InvalidOperation(_)), "{err}");
    assert_eq!(err.code(), ErrorCode::InvalidOperation);

    let after = snapshot::capture(f.mm.connection(), f.doc).expect("capture");
    assert_eq!(before.nodes, after.nodes);
    assert_eq!(before.node_count, after.node_count);
}

#[test]
fn moves_cascade_depth_through_the_subtree() {
    let f = fixture();
    let c = add(&f.mm, f.doc, f.b, "C");
    let d = add(&f.mm, f.doc, c.id, "D");

    f.mm.tree()
        .move_node(&ctx(), f.b, Some(f.a), None)
        .expect("move");
    assert_eq!(f.mm.tree().get_node(c.id).expect("C").depth, 3);
    assert_eq!(f.mm.tree().get_node(d.id).expect("D").depth, 4);

    let ancestors: Vec<_> = f
        .mm
        .tree()
        .get_ancestors(d.id)
        .expect("ancestors")
        .into_iter()
        .map(|n| n.content)
        .collect();
    assert_eq!(ancestors, ["C", "B", "A", "R"]);
    assert!(f.mm.tree().check_integrity(f.doc).expect("check").is_ok());
}

#[test]
fn deleting_a_subtree_closes_the_sibling_gap() {
    let f = fixture();
    let c = add(&f.mm, f.doc, f.root, "C");
    add(&f.mm, f.doc, f.a, "A1");
    add(&f.mm, f.doc, f.a, "A2");

    let deleted = f.mm.tree().delete_node(&ctx(), f.a).expect("delete A");
    assert_eq!(deleted, 3);
    assert_eq!(children(&f.mm, f.root), vec![f.b, c.id]);
    assert!(f.mm.tree().get_node(f.a).is_err());
    assert!(f.mm.tree().check_integrity(f.doc).expect("check").is_ok());
}

#[test]
fn root_cannot_be_deleted() {
    let f = fixture();
    let err = f
        .mm
        .tree()
        .delete_node(&ctx(), f.root)
        .expect_err("root is protected");
    assert!(matches!(err, MindmapError::InvalidOperation(_)));
}

#[test]
fn reorder_requires_an_exact_permutation() {
    let f = fixture();
    let c = add(&f.mm, f.doc, f.root, "C");

    let order = f
        .mm
        .tree()
        .reorder_children(&ctx(), f.root, &[c.id, f.a, f.b])
        .expect("reorder");
    assert_eq!(order, vec![c.id, f.a, f.b]);

    for bad in [vec![c.id, f.a], vec![c.id, f.a, f.a], vec![c.id, f.a, f.root]] {
        let err = f
            .mm
            .tree()
            .reorder_children(&ctx(), f.root, &bad)
            .expect_err("not a permutation");
        assert!(matches!(err, MindmapError::InvalidOperation(_)));
    }
    assert_eq!(children(&f.mm, f.root), vec![c.id, f.a, f.b]);
}

#[test]
fn nodes_of_other_documents_are_invalid_references() {
    let f = fixture();
    let (other, other_root) = f
        .mm
        .create_document(&ctx(), &mindmap_core::model::NewDocument::titled("Other"))
        .expect("second document");

    let err = f
        .mm
        .tree()
        .create_node(
            &ctx(),
            f.doc,
            Some(other_root.id),
            &NodeFields::with_content("x"),
        )
        .expect_err("foreign parent");
    assert!(matches!(err, MindmapError::InvalidReference(_)));

    let err = f
        .mm
        .chunks()
        .get_subtree_chunk(other.id, f.a)
        .expect_err("foreign chunk");
    assert!(matches!(err, MindmapError::InvalidReference(_)));
}

#[test]
fn replayed_edit_is_applied_once() {
    let f = fixture();
    let op = ctx().with_op_id("rename-a");
    let patch = NodePatch {
        content: Some("Alpha".to_string()),
        ..NodePatch::default()
    };
    f.mm.tree()
        .update_node(&op, f.a, &patch)
        .expect("first update");

    let again = NodePatch {
        content: Some("Ignored".to_string()),
        ..NodePatch::default()
    };
    let node = f.mm.tree().update_node(&op, f.a, &again).expect("replay");
    assert_eq!(node.content, "Alpha");

    let ops = f.mm.oplog().get_operations(f.doc, None).expect("ops");
    assert_eq!(ops.iter().filter(|o| o.op_id == "rename-a").count(), 1);
}

// ---------------------------------------------------------------------------
// Operation log
// ---------------------------------------------------------------------------

#[test]
fn duplicate_op_id_is_stored_once() {
    let f = fixture();
    let op = NewOperation {
        op_id: "x1".to_string(),
        document_id: f.doc,
        op_type: OpType::Update,
        node_id: Some(f.a),
        payload: json!({ "content": "A" }),
        user_id: USER,
        causality_ts: Some(42),
    };
    let first = f.mm.oplog().record_operation(&op).expect("first");
    let second = f.mm.oplog().record_operation(&op).expect("second");
    assert_eq!(first, second);

    let ops = f.mm.oplog().get_operations(f.doc, None).expect("ops");
    assert_eq!(ops.iter().filter(|o| o.op_id == "x1").count(), 1);
}

#[test]
fn replay_order_follows_causality_not_arrival() {
    let f = fixture();
    for (op_id, ts) in [("late", 300), ("early", 100), ("middle", 200)] {
        f.mm.oplog()
            .record_operation(&NewOperation {
                op_id: op_id.to_string(),
                document_id: f.doc,
                op_type: OpType::Update,
                node_id: Some(f.b),
                payload: json!({}),
                user_id: USER,
                causality_ts: Some(ts),
            })
            .expect("record");
    }
    let replay: Vec<_> = f
        .mm
        .oplog()
        .get_operations_for_replay(f.doc, 100, 300)
        .expect("replay")
        .into_iter()
        .map(|o| o.op_id)
        .collect();
    assert_eq!(replay, ["early", "middle", "late"]);
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

#[test]
fn autosaves_are_pruned_to_the_ten_newest() {
    let f = fixture();
    for _ in 0..11 {
        f.mm.versions().auto_save(f.doc, USER).expect("autosave");
    }
    let autosaves = f
        .mm
        .versions()
        .list_versions(f.doc, Some(VersionType::Autosave))
        .expect("list");
    assert_eq!(autosaves.len(), 10);
    let numbers: Vec<_> = autosaves.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, (2..=11).rev().collect::<Vec<_>>());
}

#[test]
fn explicit_versions_survive_autosave_pruning() {
    let f = fixture();
    let keep = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("explicit");
    for _ in 0..12 {
        f.mm.versions().auto_save(f.doc, USER).expect("autosave");
    }
    assert_eq!(
        f.mm.versions().get_version(keep.id).expect("kept").name,
        "Version 1"
    );
}

#[test]
fn latest_version_cannot_be_deleted() {
    let f = fixture();
    let versions = f.mm.versions();
    let v1 = versions
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v1");
    let v2 = versions
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v2");

    let err = versions.delete_version(v2.id).expect_err("latest");
    assert!(matches!(err, MindmapError::InvalidOperation(_)));
    versions.delete_version(v1.id).expect("older version");
    assert!(versions.get_version(v1.id).is_err());
}

#[test]
fn restore_reproduces_the_saved_tree() {
    let f = fixture();
    let c = add(&f.mm, f.doc, f.a, "C");
    add(&f.mm, f.doc, c.id, "D");
    let saved = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("save");

    f.mm.tree().delete_node(&ctx(), f.a).expect("delete");
    add(&f.mm, f.doc, f.b, "E");
    f.mm.tree()
        .update_node(
            &ctx(),
            f.root,
            &NodePatch {
                content: Some("Renamed".to_string()),
                ..NodePatch::default()
            },
        )
        .expect("rename root");

    let outcome = f
        .mm
        .versions()
        .restore_version(saved.id, USER, true)
        .expect("restore");
    assert_eq!(outcome.node_count, 5);
    assert!(outcome.backup.is_some());

    let expected = mindmap_core::version::Snapshot::parse(&saved.snapshot_data, f.mm.config())
        .expect("parse");
    let current = snapshot::capture(f.mm.connection(), f.doc).expect("capture");
    assert_eq!(
        shape(expected.nodes.as_ref().expect("saved tree")),
        shape(current.nodes.as_ref().expect("restored tree"))
    );
    assert!(f.mm.tree().check_integrity(f.doc).expect("check").is_ok());

    let root = f.mm.tree().find_root(f.doc).expect("root");
    assert_eq!(Some(root.id), outcome.root_id);
    assert_ne!(root.id, f.root);
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

#[test]
fn node_both_moved_and_edited_appears_in_both_lists() {
    let f = fixture();
    let n = add(&f.mm, f.doc, f.b, "N");
    let v1 = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v1");

    f.mm.tree()
        .move_node(&ctx(), n.id, Some(f.a), None)
        .expect("move");
    f.mm.tree()
        .update_node(
            &ctx(),
            n.id,
            &NodePatch {
                content: Some("N2".to_string()),
                ..NodePatch::default()
            },
        )
        .expect("edit");
    let v2 = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v2");

    let diff = f.mm.diff().compare_versions(v1.id, v2.id).expect("diff");
    assert_eq!(diff.updated_nodes.len(), 1);
    let updated = &diff.updated_nodes[0];
    assert_eq!(updated.node_id, n.id);
    assert_eq!(updated.change_type, Some(ChangeType::Content));
    assert_eq!(updated.old_value.as_deref(), Some("N"));
    assert_eq!(updated.new_value.as_deref(), Some("N2"));

    assert_eq!(diff.moved_nodes.len(), 1);
    let moved = &diff.moved_nodes[0];
    assert_eq!(moved.node_id, n.id);
    assert_eq!(moved.old_parent_id, Some(f.b));
    assert_eq!(moved.new_parent_id, Some(f.a));
    assert_eq!(moved.old_path, "R > B > N");
    assert_eq!(moved.new_path, "R > A > N2");

    assert_eq!(diff.stats.updated, 1);
    assert_eq!(diff.stats.moved, 1);
    assert_eq!(diff.stats.added + diff.stats.removed, 0);
}

#[test]
fn a_version_diffed_with_itself_is_empty() {
    let f = fixture();
    let v = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v");
    let diff = f.mm.diff().compare_versions(v.id, v.id).expect("diff");
    assert!(diff.stats.is_empty());
    assert!(diff.added_nodes.is_empty());
    assert!(diff.removed_nodes.is_empty());
    assert!(diff.updated_nodes.is_empty());
    assert!(diff.moved_nodes.is_empty());
}

#[test]
fn compare_with_current_sees_live_edits() {
    let f = fixture();
    let v = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v");
    assert!(
        f.mm.diff()
            .compare_with_current(f.doc, v.id)
            .expect("clean")
            .stats
            .is_empty()
    );

    let c = add(&f.mm, f.doc, f.a, "C");
    f.mm.tree().delete_node(&ctx(), f.b).expect("delete B");
    f.mm.tree()
        .update_node(
            &ctx(),
            f.a,
            &NodePatch {
                color: Some("#ff0000".to_string()),
                ..NodePatch::default()
            },
        )
        .expect("recolor");

    let diff = f.mm.diff().compare_with_current(f.doc, v.id).expect("diff");
    assert_eq!(diff.to_version_id, None);
    assert_eq!(diff.added_nodes.len(), 1);
    assert_eq!(diff.added_nodes[0].node_id, c.id);
    assert_eq!(diff.removed_nodes.len(), 1);
    assert_eq!(diff.removed_nodes[0].node_id, f.b);
    assert_eq!(diff.updated_nodes.len(), 1);
    assert_eq!(diff.updated_nodes[0].change_type, Some(ChangeType::Style));
}

#[test]
fn corrupt_snapshot_fails_the_diff() {
    let f = fixture();
    let v = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v");
    f.mm.connection()
        .execute(
            "UPDATE versions SET snapshot_data = 'not json' WHERE version_id = ?1",
            [v.id.0],
        )
        .expect("corrupt");

    let err = f
        .mm
        .diff()
        .compare_with_current(f.doc, v.id)
        .expect_err("corrupt snapshot");
    assert_eq!(err.code(), ErrorCode::Serialization);
}

#[test]
fn deeply_nested_snapshot_is_rejected_without_touching_the_tree() {
    let f = fixture();
    let v = f
        .mm
        .versions()
        .create_version(f.doc, VersionType::Explicit, &VersionOptions::default())
        .expect("v");
    let depth = 200_000;
    let mut nested = r#"{"children":["#.repeat(depth);
    nested.push_str(&"]}".repeat(depth));
    f.mm.connection()
        .execute(
            "UPDATE versions SET snapshot_data = ?1 WHERE version_id = ?2",
            rusqlite::params![nested, v.id.0],
        )
        .expect("corrupt");
    let before = f.mm.tree().get_subtree_ids(f.root).expect("ids");

    let err = f
        .mm
        .diff()
        .compare_with_current(f.doc, v.id)
        .expect_err("nested too deep");
    assert_eq!(err.code(), ErrorCode::Serialization);
    let err = f
        .mm
        .versions()
        .restore_version(v.id, USER, true)
        .expect_err("nested too deep");
    assert_eq!(err.code(), ErrorCode::Serialization);

    assert_eq!(f.mm.tree().get_subtree_ids(f.root).expect("ids"), before);
    let versions = f.mm.versions().list_versions(f.doc, None).expect("list");
    assert_eq!(versions.len(), 1);
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

#[test]
fn chunks_respect_size_and_depth_bounds() {
    let f = fixture();
    for i in 0..150 {
        add(&f.mm, f.doc, f.b, &format!("wide {i}"));
    }
    let mut parent = f.a;
    let mut chain = Vec::new();
    for i in 0..6 {
        parent = add(&f.mm, f.doc, parent, &format!("deep {i}")).id;
        chain.push(parent);
    }

    let chunk = f.mm.chunks().get_root_chunk(f.doc).expect("root chunk");
    assert_eq!(chunk.kind, ChunkKind::Root);
    assert_eq!(chunk.chunk_key, "root");
    assert!(chunk.node_count <= 100);
    assert_eq!(chunk.node_count, chunk.child_nodes.len() + 1);
    assert!(chunk.has_more);
    assert!(!chunk.frontier.is_empty());

    let deep = f
        .mm
        .chunks()
        .get_subtree_chunk(f.doc, f.a)
        .expect("subtree chunk");
    assert_eq!(deep.chunk_key, format!("subtree:{}", f.a));
    assert!(deep.child_nodes.iter().all(|n| n.depth <= 1 + 3));
    assert_eq!(deep.max_depth, 4);
    assert_eq!(deep.frontier, vec![chain[2]]);
    assert!(deep.has_more);

    let leaf = f
        .mm
        .chunks()
        .get_subtree_chunk(f.doc, chain[5])
        .expect("leaf chunk");
    assert_eq!(leaf.node_count, 1);
    assert!(!leaf.has_more);
    assert!(leaf.frontier.is_empty());
}

#[test]
fn mutations_invalidate_cached_chunks() {
    let f = fixture();
    let before = f.mm.chunks().get_root_chunk(f.doc).expect("chunk");
    assert_eq!(before.node_count, 3);
    let again = f.mm.chunks().get_root_chunk(f.doc).expect("cached");
    assert!(std::sync::Arc::ptr_eq(&before, &again));

    add(&f.mm, f.doc, f.a, "C");
    let after = f.mm.chunks().get_root_chunk(f.doc).expect("rebuilt");
    assert_eq!(after.node_count, 4);

    let stats = f.mm.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[test]
fn nodes_load_by_depth_range() {
    let f = fixture();
    add(&f.mm, f.doc, f.a, "C");
    let level: Vec<_> = f
        .mm
        .chunks()
        .load_nodes_by_level(f.doc, 1, 1)
        .expect("level 1")
        .into_iter()
        .map(|n| n.content)
        .collect();
    assert_eq!(level, ["A", "B"]);
    assert!(f.mm.chunks().load_nodes_by_level(f.doc, 2, 1).is_err());
}
