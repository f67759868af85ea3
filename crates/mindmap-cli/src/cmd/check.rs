//! `mm check`: structural integrity report for one document.

use super::Session;
use crate::output::{pretty_kv, render};
use clap::Args;
use mindmap_core::model::DocumentId;
use mindmap_core::tree::Violation;

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub doc: DocumentId,
}

fn describe(v: &Violation) -> String {
    match v {
        Violation::MissingRoot => "no live root".to_string(),
        Violation::MultipleRoots { roots } => format!("several live roots: {roots:?}"),
        Violation::DanglingParent { node, parent } => {
            format!("node {node} points at missing parent {parent}")
        }
        Violation::DepthMismatch {
            node,
            expected,
            actual,
        } => format!("node {node} has depth {actual}, expected {expected}"),
        Violation::Unreachable { node } => format!("node {node} is unreachable from the root"),
        Violation::RankGap { parent, ranks } => {
            format!("children of {parent} have non-contiguous ranks {ranks:?}")
        }
    }
}

/// Fails (non-zero exit) when any violation is found.
pub fn run_check(args: &CheckArgs, session: &Session<'_>) -> anyhow::Result<()> {
    let report = session.mm.tree().check_integrity(args.doc)?;
    render(session.output, &report, |r, w| {
        pretty_kv(w, "document", r.document_id.to_string())?;
        pretty_kv(w, "nodes", r.node_count.to_string())?;
        if r.is_ok() {
            return pretty_kv(w, "status", "ok");
        }
        for v in &r.violations {
            writeln!(w, "  ! {}", describe(v))?;
        }
        Ok(())
    })?;
    if !report.is_ok() {
        anyhow::bail!(
            "document {} has {} integrity violation(s)",
            args.doc,
            report.violations.len()
        );
    }
    Ok(())
}
