//! Content commands: listing, metadata, reading, copying, moving and
//! deleting documents, creating folders, plus navigation of the base-URL
//! stack.
//!
//! Every URL argument may be relative; it is resolved against the current
//! base URL (see `cd`, `push` and `pop`).

use super::SampleCommand;
use crate::cli::{HandlerFuture, Invocation};
use crate::client::uri::Uri;
use crate::client::{EntryKind, ListEntry};
use crate::context::SampleContext;
use crate::error::SampleError;
use crate::session::Payload;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(super) fn commands() -> Vec<SampleCommand> {
    vec![
        SampleCommand::new("list", list)
            .args("[url]")
            .about("List the contents of a folder"),
        SampleCommand::new("ls", list),
        SampleCommand::new("dir", list),
        SampleCommand::new("stat", stat)
            .args("<url>")
            .about("Print information about a document, folder or channel"),
        SampleCommand::new("cat", cat)
            .args("<url>")
            .about("Print the contents of a document"),
        SampleCommand::new("copy", copy)
            .args("<src> <dst>")
            .about("Copy a document\nThe destination is overwritten"),
        SampleCommand::new("cp", copy),
        SampleCommand::new("move", move_item)
            .args("<src> <dst>")
            .about("Move a document or folder\nMoving onto a folder keeps the name"),
        SampleCommand::new("mv", move_item),
        SampleCommand::new("del", delete)
            .args("<url>")
            .about("Delete a document, folder or channel"),
        SampleCommand::new("delete", delete),
        SampleCommand::new("rm", delete),
        SampleCommand::new("mkdir", mkdir)
            .args("<url>")
            .about("Create a folder"),
        SampleCommand::new("cd", cd)
            .args("[url]")
            .about("Change or print the base URL"),
        SampleCommand::new("push", push)
            .args("<url>")
            .about("Push a new base URL"),
        SampleCommand::new("pushd", push),
        SampleCommand::new("pop", pop).about("Return to the previous base URL"),
        SampleCommand::new("popd", pop),
    ]
}

const fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Folder => "folder",
        EntryKind::Document => "document",
        EntryKind::Channel => "channel",
    }
}

/// Formats a listing as `date kind owner name` rows, padding the kind and
/// owner columns to their longest value.
fn format_listing(folder: &Uri, entries: &[ListEntry]) -> Vec<String> {
    let kind_width = entries
        .iter()
        .map(|e| kind_label(e.kind).len())
        .max()
        .unwrap_or(0);
    let owner_width = entries
        .iter()
        .map(|e| e.modified_by.len())
        .max()
        .unwrap_or(0);

    entries
        .iter()
        .map(|entry| {
            let name = folder
                .relative_path(&entry.uri)
                .unwrap_or_else(|| entry.uri.path());
            format!(
                "{} {:<kind_width$} {:<owner_width$} {name}",
                entry.modified_at.format(DATE_FORMAT),
                kind_label(entry.kind),
                entry.modified_by,
            )
        })
        .collect()
}

fn list<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let folder = inv.ctx.resolve(inv.arg(1))?.as_folder();
        let entries = inv.ctx.client().list(&folder)?;
        tracing::debug!(%folder, count = entries.len(), "listed");
        let console = inv.ctx.console();
        if entries.is_empty() {
            console.line(format!("{folder} is empty"));
        }
        for row in format_listing(&folder, &entries) {
            console.line(row);
        }
        Ok(())
    })
}

fn stat<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        let entry = inv.ctx.client().stat(&uri)?;
        inv.ctx.console().line(serde_json::to_string_pretty(&entry)?);
        Ok(())
    })
}

fn cat<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        let bytes = inv.ctx.client().read(&uri)?;
        inv.ctx.console().line(Payload::sniff(&bytes).to_string());
        Ok(())
    })
}

fn copy<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let src = inv.ctx.resolve(Some(inv.require(1, "source url")?))?;
        let dst = inv.ctx.resolve(Some(inv.require(2, "destination url")?))?;
        inv.ctx.client().copy(&src, &dst)?;
        inv.ctx.console().line(format!("Copied {src} to {dst}"));
        Ok(())
    })
}

fn move_item<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let src = inv.ctx.resolve(Some(inv.require(1, "source url")?))?;
        let dst = inv.ctx.resolve(Some(inv.require(2, "destination url")?))?;
        inv.ctx.client().move_item(&src, &dst)?;
        inv.ctx.console().line(format!("Moved {src} to {dst}"));
        Ok(())
    })
}

fn mkdir<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?.as_folder();
        inv.ctx.client().create_folder(&uri)?;
        inv.ctx.console().line(format!("Created folder {uri}"));
        Ok(())
    })
}

fn delete<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        inv.ctx.client().delete(&uri)?;
        inv.ctx.console().line(format!("Deleted {uri}"));
        Ok(())
    })
}

fn cd<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        if let Some(reference) = inv.arg(1) {
            let uri = inv.ctx.resolve(Some(reference))?;
            inv.ctx.set_base_url(uri);
        }
        inv.ctx
            .console()
            .line(format!("Base URL: {}", inv.ctx.base_url()));
        Ok(())
    })
}

fn push<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        inv.ctx.push_base_url(uri);
        inv.ctx
            .console()
            .line(format!("Base URL: {}", inv.ctx.base_url()));
        Ok(())
    })
}

fn pop<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let base = inv
            .ctx
            .pop_base_url()
            .ok_or_else(|| SampleError::NotFound("no pushed base URL".to_string()))?;
        inv.ctx.console().line(format!("Base URL: {base}"));
        Ok(())
    })
}
