//! `mm version`: snapshots, autosaves and restore.

use super::Session;
use crate::output::{pretty_kv, pretty_section, render};
use anyhow::Context;
use clap::Subcommand;
use mindmap_core::model::{DocumentId, Version, VersionId, VersionType};
use mindmap_core::version::{Snapshot, VersionOptions};
use serde_json::json;
use std::io::{self, Write};

#[derive(Subcommand, Debug)]
pub enum VersionCommand {
    /// Save the live tree as an explicit version.
    Save {
        doc: DocumentId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Take an autosave (older autosaves beyond the retention limit are pruned).
    Autosave { doc: DocumentId },

    /// List live versions, newest first.
    List {
        doc: DocumentId,

        /// `autosave` or `explicit`.
        #[arg(long = "type")]
        version_type: Option<VersionType>,
    },

    /// Show version metadata, and the stored tree with `--snapshot`.
    Show {
        id: VersionId,

        #[arg(long)]
        snapshot: bool,
    },

    /// Delete a version. The latest one is protected.
    Delete { id: VersionId },

    /// Replace the live tree with the tree stored in a version.
    Restore {
        id: VersionId,

        /// Skip the backup version of the current tree.
        #[arg(long)]
        no_backup: bool,
    },
}

fn write_version_line(w: &mut dyn Write, v: &Version) -> io::Result<()> {
    writeln!(
        w,
        "{:>4}  {:<9} {:>5} nodes  {}",
        v.version_number, v.version_type, v.node_count, v.name
    )
}

pub fn run_version(cmd: &VersionCommand, session: &Session<'_>) -> anyhow::Result<()> {
    let versions = session.mm.versions();
    match cmd {
        VersionCommand::Save {
            doc,
            name,
            description,
        } => {
            let options = VersionOptions {
                name: name.clone(),
                description: description.clone(),
                created_by: Some(session.user),
            };
            let version = versions
                .create_version(*doc, VersionType::Explicit, &options)
                .with_context(|| format!("save document {doc}"))?;
            render(session.output, &version, |v, w| write_version_line(w, v))
        }
        VersionCommand::Autosave { doc } => {
            let version = versions
                .auto_save(*doc, session.user)
                .with_context(|| format!("autosave document {doc}"))?;
            render(session.output, &version, |v, w| write_version_line(w, v))
        }
        VersionCommand::List { doc, version_type } => {
            let list = versions.list_versions(*doc, *version_type)?;
            render(session.output, &list, |list, w| {
                for v in list {
                    write_version_line(w, v)?;
                }
                Ok(())
            })
        }
        VersionCommand::Show { id, snapshot } => {
            let version = versions.get_version(*id)?;
            let tree = if *snapshot {
                Some(Snapshot::parse(&version.snapshot_data, session.mm.config())?)
            } else {
                None
            };
            let value = json!({
                "id": version.id,
                "documentId": version.document_id,
                "versionNumber": version.version_number,
                "versionType": version.version_type,
                "name": version.name,
                "description": version.description,
                "nodeCount": version.node_count,
                "snapshotSize": version.snapshot_size,
                "createdBy": version.created_by,
                "createdAtUs": version.created_at_us,
                "snapshot": tree,
            });
            render(session.output, &value, |_, w| {
                pretty_section(w, &version.name)?;
                pretty_kv(w, "number", version.version_number.to_string())?;
                pretty_kv(w, "type", version.version_type.as_str())?;
                pretty_kv(w, "document", version.document_id.to_string())?;
                pretty_kv(w, "nodes", version.node_count.to_string())?;
                pretty_kv(w, "bytes", version.snapshot_size.to_string())?;
                if let Some(description) = &version.description {
                    pretty_kv(w, "description", description)?;
                }
                if let Some(root) = tree.as_ref().and_then(|s| s.nodes.as_ref()) {
                    writeln!(w)?;
                    let mut stack = vec![root];
                    while let Some(node) = stack.pop() {
                        let indent = usize::try_from(node.depth).unwrap_or(0) * 2;
                        writeln!(w, "{:indent$}- {}", "", node.content)?;
                        stack.extend(node.children.iter().rev());
                    }
                }
                Ok(())
            })
        }
        VersionCommand::Delete { id } => {
            versions
                .delete_version(*id)
                .with_context(|| format!("delete version {id}"))?;
            let value = json!({ "versionId": id, "deleted": true });
            render(session.output, &value, |_, w| writeln!(w, "deleted version {id}"))
        }
        VersionCommand::Restore { id, no_backup } => {
            let outcome = versions
                .restore_version(*id, session.user, !*no_backup)
                .with_context(|| format!("restore version {id}"))?;
            render(session.output, &outcome, |o, w| {
                pretty_kv(w, "document", o.document_id.to_string())?;
                pretty_kv(w, "restored", format!("{} nodes", o.node_count))?;
                if let Some(backup) = o.backup {
                    pretty_kv(w, "backup", format!("version id {backup}"))?;
                }
                Ok(())
            })
        }
    }
}
