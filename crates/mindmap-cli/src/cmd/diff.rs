//! `mm diff`: compare two versions, or a version with the live tree.

use super::Session;
use crate::output::{pretty_section, render};
use anyhow::Context;
use clap::Args;
use mindmap_core::diff::{ChangeType, VersionDiff};
use mindmap_core::model::VersionId;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Older side of the comparison.
    pub from: VersionId,

    /// Newer side; the live tree of the same document when omitted.
    pub to: Option<VersionId>,
}

fn write_diff(w: &mut dyn Write, diff: &VersionDiff) -> io::Result<()> {
    let stats = &diff.stats;
    if stats.is_empty() {
        return writeln!(w, "no changes");
    }
    pretty_section(
        w,
        &format!(
            "{} added, {} removed, {} updated, {} moved",
            stats.added, stats.removed, stats.updated, stats.moved
        ),
    )?;
    for node in &diff.added_nodes {
        writeln!(w, "+ [{}] {}", node.node_id, node.content)?;
    }
    for node in &diff.removed_nodes {
        writeln!(w, "- [{}] {}", node.node_id, node.content)?;
    }
    for node in &diff.updated_nodes {
        let what = match node.change_type {
            Some(ChangeType::Style) => "style",
            _ => "content",
        };
        writeln!(
            w,
            "~ [{}] {what}: {} -> {}",
            node.node_id,
            node.old_value.as_deref().unwrap_or(""),
            node.new_value.as_deref().unwrap_or("")
        )?;
    }
    for node in &diff.moved_nodes {
        writeln!(
            w,
            "> [{}] {} => {}",
            node.node_id, node.old_path, node.new_path
        )?;
    }
    Ok(())
}

pub fn run_diff(args: &DiffArgs, session: &Session<'_>) -> anyhow::Result<()> {
    let engine = session.mm.diff();
    let diff = match args.to {
        Some(to) => engine
            .compare_versions(args.from, to)
            .with_context(|| format!("compare versions {} and {to}", args.from))?,
        None => {
            let from = session.mm.versions().get_version(args.from)?;
            engine
                .compare_with_current(from.document_id, args.from)
                .with_context(|| format!("compare version {} with live tree", args.from))?
        }
    };
    render(session.output, &diff, |d, w| write_diff(w, d))
}
