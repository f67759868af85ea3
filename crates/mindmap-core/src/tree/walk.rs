//! Bounded, iterative walks over stored parent links.
//!
//! - Ancestor walks stop after `max_hops` and treat a revisit as corruption.
//! - Subtree walks are breadth-first with a visited set.
//! - [`check_integrity`] audits a whole document against the tree rules.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::db::nodes;
use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, NodeId};

/// Ancestors of `start`, nearest first, ending at the root.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if `start` is not live, and
/// [`MindmapError::DataIntegrity`] if the chain revisits a node, runs past
/// `max_hops`, or points at a missing parent.
pub fn ancestor_ids(conn: &Connection, start: NodeId, max_hops: usize) -> Result<Vec<NodeId>> {
    let mut parent =
        nodes::parent_of(conn, start)?.ok_or_else(|| MindmapError::not_found("node", start))?;
    let mut visited = HashSet::from([start]);
    let mut chain = Vec::new();

    while let Some(current) = parent {
        if chain.len() >= max_hops {
            return Err(MindmapError::DataIntegrity(format!(
                "ancestor chain of node {start} exceeds {max_hops} hops"
            )));
        }
        if !visited.insert(current) {
            return Err(MindmapError::DataIntegrity(format!(
                "cycle through node {current} above node {start}"
            )));
        }
        chain.push(current);
        parent = nodes::parent_of(conn, current)?.ok_or_else(|| {
            MindmapError::DataIntegrity(format!(
                "node {current} is referenced as a parent but is not live"
            ))
        })?;
    }
    Ok(chain)
}

/// Up to `limit` nearest ancestors of `start`, nearest first.
///
/// Unlike [`ancestor_ids`] a longer chain is not an error: the walk just
/// stops after `limit` hops, at the root, or on a revisit.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if `start` is not live.
pub fn nearest_ancestors(conn: &Connection, start: NodeId, limit: usize) -> Result<Vec<NodeId>> {
    let mut parent =
        nodes::parent_of(conn, start)?.ok_or_else(|| MindmapError::not_found("node", start))?;
    let mut chain = Vec::with_capacity(limit);
    while let Some(current) = parent {
        if chain.len() >= limit || current == start || chain.contains(&current) {
            break;
        }
        chain.push(current);
        parent = nodes::parent_of(conn, current)?.flatten();
    }
    Ok(chain)
}

/// Whether `target` is `from` or one of its ancestors.
///
/// # Errors
///
/// Same as [`ancestor_ids`].
pub fn chain_contains(
    conn: &Connection,
    from: NodeId,
    target: NodeId,
    max_hops: usize,
) -> Result<bool> {
    if from == target {
        return Ok(true);
    }
    Ok(ancestor_ids(conn, from, max_hops)?.contains(&target))
}

/// Live subtree of `root` grouped by relative depth: `levels[0] == [root]`.
///
/// Siblings keep their rank order within each level.
///
/// # Errors
///
/// Returns an error if a child query fails.
pub fn subtree_levels(conn: &Connection, root: NodeId) -> Result<Vec<Vec<NodeId>>> {
    let mut visited = HashSet::from([root]);
    let mut levels = vec![vec![root]];

    loop {
        let mut next = Vec::new();
        if let Some(level) = levels.last() {
            for &id in level {
                for child in nodes::child_ids(conn, id)? {
                    if visited.insert(child) {
                        next.push(child);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        levels.push(next);
    }
    Ok(levels)
}

/// Live subtree of `root` in breadth-first order, `root` first.
///
/// # Errors
///
/// Returns an error if a child query fails.
pub fn subtree_ids(conn: &Connection, root: NodeId) -> Result<Vec<NodeId>> {
    Ok(subtree_levels(conn, root)?.into_iter().flatten().collect())
}

/// One broken tree rule found by [`check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    MissingRoot,
    MultipleRoots { roots: Vec<NodeId> },
    DanglingParent { node: NodeId, parent: NodeId },
    DepthMismatch { node: NodeId, expected: i64, actual: i64 },
    Unreachable { node: NodeId },
    RankGap { parent: NodeId, ranks: Vec<i64> },
}

/// Result of auditing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub document_id: DocumentId,
    pub node_count: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audit every live node of a document.
///
/// Checks the single live root, parent links, depth consistency,
/// reachability from the root (which catches cycles) and contiguous sibling
/// ranks.
///
/// # Errors
///
/// Returns an error if a query fails; rule violations are reported, not
/// raised.
pub fn check_integrity(conn: &Connection, document_id: DocumentId) -> Result<IntegrityReport> {
    let all = nodes::find_all_in_document(conn, document_id)?;
    let by_id: HashMap<NodeId, (Option<NodeId>, i64)> =
        all.iter().map(|n| (n.id, (n.parent_id, n.depth))).collect();
    let mut violations = Vec::new();

    let roots: Vec<NodeId> = all.iter().filter(|n| n.is_root()).map(|n| n.id).collect();
    match roots.as_slice() {
        [] if !all.is_empty() => violations.push(Violation::MissingRoot),
        [] | [_] => {}
        _ => violations.push(Violation::MultipleRoots {
            roots: roots.clone(),
        }),
    }

    for node in &all {
        match node.parent_id {
            None if node.depth != 0 => violations.push(Violation::DepthMismatch {
                node: node.id,
                expected: 0,
                actual: node.depth,
            }),
            None => {}
            Some(parent) => match by_id.get(&parent) {
                None => violations.push(Violation::DanglingParent {
                    node: node.id,
                    parent,
                }),
                Some(&(_, parent_depth)) if node.depth != parent_depth + 1 => {
                    violations.push(Violation::DepthMismatch {
                        node: node.id,
                        expected: parent_depth + 1,
                        actual: node.depth,
                    });
                }
                Some(_) => {}
            },
        }
    }

    // Reachability from the root(s) over live child links.
    let children: HashMap<NodeId, &[NodeId]> = all
        .iter()
        .map(|n| (n.id, n.children_order.as_slice()))
        .collect();
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().copied().filter(|k| !seen.contains(k)));
        }
    }
    for node in &all {
        let dangling = node.parent_id.is_some_and(|p| !by_id.contains_key(&p));
        if !seen.contains(&node.id) && !dangling {
            violations.push(Violation::Unreachable { node: node.id });
        }
    }

    let mut ranks: BTreeMap<NodeId, Vec<i64>> = BTreeMap::new();
    for (parent, _, rank) in nodes::sibling_ranks(conn, document_id)? {
        ranks.entry(parent).or_default().push(rank);
    }
    for (parent, ranks) in ranks {
        let contiguous = ranks.iter().copied().eq(0..crate::db::sql_count(ranks.len()));
        if !contiguous {
            violations.push(Violation::RankGap { parent, ranks });
        }
    }

    if violations.is_empty() {
        tracing::debug!(document_id = %document_id, nodes = all.len(), "integrity check clean");
    } else {
        tracing::warn!(
            document_id = %document_id,
            violations = violations.len(),
            "integrity check found violations"
        );
    }

    Ok(IntegrityReport {
        document_id,
        node_count: all.len(),
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::nodes::Placement;
    use crate::db::{documents, open_in_memory};
    use crate::model::NodeFields;

    struct Fixture {
        conn: Connection,
        doc: DocumentId,
    }

    impl Fixture {
        fn new() -> Self {
            let conn = open_in_memory().expect("open");
            let doc = documents::insert(&conn, "Doc", "default", "private", 1).expect("doc");
            Self { conn, doc }
        }

        fn add(&self, parent: Option<NodeId>, depth: i64) -> NodeId {
            let rank = parent.map_or(Ok(0), |p| nodes::next_rank(&self.conn, p)).expect("rank");
            nodes::insert(
                &self.conn,
                Placement {
                    document_id: self.doc,
                    parent_id: parent,
                    rank,
                    depth,
                },
                &NodeFields::with_content("n"),
                1,
            )
            .expect("insert")
        }
    }

    #[test]
    fn ancestors_run_nearest_first() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        let b = f.add(Some(a), 2);

        assert_eq!(ancestor_ids(&f.conn, b, 100).expect("walk"), vec![a, root]);
        assert!(ancestor_ids(&f.conn, root, 100).expect("walk").is_empty());
        assert!(chain_contains(&f.conn, b, root, 100).expect("walk"));
        assert!(!chain_contains(&f.conn, a, b, 100).expect("walk"));
    }

    #[test]
    fn nearest_ancestors_stop_at_limit_without_error() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        let b = f.add(Some(a), 2);
        let c = f.add(Some(b), 3);

        assert_eq!(nearest_ancestors(&f.conn, c, 2).expect("walk"), vec![b, a]);
        assert_eq!(nearest_ancestors(&f.conn, c, 10).expect("walk"), vec![b, a, root]);
        assert!(nearest_ancestors(&f.conn, c, 0).expect("walk").is_empty());
        assert!(matches!(
            nearest_ancestors(&f.conn, NodeId(999), 3),
            Err(MindmapError::NotFound { .. })
        ));
    }

    #[test]
    fn hop_cap_is_data_integrity() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        let b = f.add(Some(a), 2);
        let err = ancestor_ids(&f.conn, b, 1).expect_err("cap");
        assert!(matches!(err, MindmapError::DataIntegrity(_)));
    }

    #[test]
    fn corrupt_cycle_is_detected() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        let b = f.add(Some(a), 2);
        // Simulate corruption: a <-> b.
        f.conn
            .execute(
                "UPDATE nodes SET parent_id = ?1 WHERE node_id = ?2",
                rusqlite::params![b, a],
            )
            .expect("corrupt");

        let err = ancestor_ids(&f.conn, b, 100).expect_err("cycle");
        assert!(matches!(err, MindmapError::DataIntegrity(_)));

        let report = check_integrity(&f.conn, f.doc).expect("check");
        assert!(report.violations.contains(&Violation::Unreachable { node: a }));
        assert!(report.violations.contains(&Violation::Unreachable { node: b }));
    }

    #[test]
    fn subtree_levels_follow_rank_order() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        let b = f.add(Some(root), 1);
        let a1 = f.add(Some(a), 2);

        let levels = subtree_levels(&f.conn, root).expect("levels");
        assert_eq!(levels, vec![vec![root], vec![a, b], vec![a1]]);
        assert_eq!(subtree_ids(&f.conn, a).expect("ids"), vec![a, a1]);
    }

    #[test]
    fn clean_tree_passes_and_bad_depth_is_reported() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        assert!(check_integrity(&f.conn, f.doc).expect("check").is_ok());

        nodes::set_depth(&f.conn, a, 4).expect("corrupt");
        let report = check_integrity(&f.conn, f.doc).expect("check");
        assert_eq!(
            report.violations,
            vec![Violation::DepthMismatch {
                node: a,
                expected: 1,
                actual: 4
            }]
        );
    }

    #[test]
    fn rank_gap_is_reported() {
        let f = Fixture::new();
        let root = f.add(None, 0);
        let a = f.add(Some(root), 1);
        let _b = f.add(Some(root), 1);
        nodes::mark_deleted(&f.conn, &[a], 2).expect("delete without compaction");

        let report = check_integrity(&f.conn, f.doc).expect("check");
        assert_eq!(
            report.violations,
            vec![Violation::RankGap {
                parent: root,
                ranks: vec![1]
            }]
        );
    }
}
