//! `mm doc`: create, list, show and delete documents.

use super::{EditArgs, Session};
use crate::output::{pretty_kv, pretty_section, render};
use anyhow::Context;
use clap::Subcommand;
use mindmap_core::model::{DocumentId, NewDocument};
use serde_json::json;

#[derive(Subcommand, Debug)]
pub enum DocCommand {
    /// Create a document and its root node.
    Create {
        /// Title, also used as the root node's content.
        title: String,

        #[arg(long)]
        theme: Option<String>,

        #[arg(long)]
        visibility: Option<String>,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// List live documents, newest first.
    List,

    /// Show one document and its root node.
    Show { id: DocumentId },

    /// Delete a document and all of its nodes.
    Delete { id: DocumentId },
}

pub fn run_doc(cmd: &DocCommand, session: &Session<'_>) -> anyhow::Result<()> {
    let mm = session.mm;
    match cmd {
        DocCommand::Create {
            title,
            theme,
            visibility,
            edit,
        } => {
            let new = NewDocument {
                title: title.clone(),
                theme: theme.clone(),
                visibility: visibility.clone(),
            };
            let (doc, root) = mm
                .create_document(&edit.context(session.user), &new)
                .context("create document")?;
            let value = json!({ "document": doc, "root": root });
            render(session.output, &value, |_, w| {
                pretty_kv(w, "document", doc.id.to_string())?;
                pretty_kv(w, "title", &doc.title)?;
                pretty_kv(w, "root", root.id.to_string())
            })
        }
        DocCommand::List => {
            let docs = mm.list_documents()?;
            render(session.output, &docs, |docs, w| {
                if docs.is_empty() {
                    return writeln!(w, "no documents");
                }
                for doc in docs {
                    writeln!(w, "{:>6}  {:<10} {}", doc.id, doc.theme, doc.title)?;
                }
                Ok(())
            })
        }
        DocCommand::Show { id } => {
            let doc = mm
                .get_document(*id)
                .with_context(|| format!("show document {id}"))?;
            let root = mm.tree().find_root(*id)?;
            let value = json!({ "document": doc, "root": root });
            render(session.output, &value, |_, w| {
                pretty_section(w, &doc.title)?;
                pretty_kv(w, "id", doc.id.to_string())?;
                pretty_kv(w, "theme", &doc.theme)?;
                pretty_kv(w, "visibility", &doc.visibility)?;
                pretty_kv(w, "root", root.id.to_string())?;
                pretty_kv(w, "top-level", root.children_order.len().to_string())
            })
        }
        DocCommand::Delete { id } => {
            let nodes = mm
                .delete_document(*id)
                .with_context(|| format!("delete document {id}"))?;
            let value = json!({ "documentId": id, "deletedNodes": nodes });
            render(session.output, &value, |_, w| {
                writeln!(w, "deleted document {id} ({nodes} nodes)")
            })
        }
    }
}
