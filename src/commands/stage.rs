//! Document commands: create, load and close the live document, inspect,
//! edit and rename prims, and the live transform.
//!
//! Every edit goes through [`LivePump::edit`](crate::live::LivePump::edit),
//! so the mutation and the flush that publishes it happen under the same
//! lock as the background workers.

use serde_json::Value;

use super::SampleCommand;
use crate::cli::{HandlerFuture, Invocation};
use crate::client::prim::{PrimPath, valid_prim_name};
use crate::client::{FlushReport, LiveDocument};
use crate::context::SampleContext;
use crate::error::SampleError;
use crate::scene;

pub(super) fn commands() -> Vec<SampleCommand> {
    vec![
        SampleCommand::new("create", create)
            .args("<url> [boxes]")
            .about("Create a live document with a number of zone boxes\nThe document is loaded afterwards"),
        SampleCommand::new("load", load)
            .args("<url>")
            .about("Load a live document"),
        SampleCommand::new("close", close).about("Close the loaded document"),
        SampleCommand::new("prims", prims).about("List the prims of the loaded document"),
        SampleCommand::new("get", get)
            .args("<prim> [property]")
            .about("Print the properties of a prim"),
        SampleCommand::new("set", set)
            .args("<prim> <property> <value>")
            .about("Set a property and flush\nValues are JSON; anything else is a string"),
        SampleCommand::new("rename", rename)
            .args("<prim> <name>")
            .about("Rename a prim and flush\nThe name is made valid and unique among its siblings"),
        SampleCommand::new("r", rename),
        SampleCommand::new("flush", flush).about("Push local edits and pull remote updates"),
        SampleCommand::new("transform", transform)
            .args("[prim]")
            .about("Move and rotate a prim one step\nDefaults to the first mesh"),
        SampleCommand::new("t", transform),
    ]
}

fn prim_arg(inv: &Invocation<'_, SampleContext>, index: usize) -> Result<PrimPath, SampleError> {
    PrimPath::parse(inv.require(index, "prim path")?)
}

fn report_line(report: &FlushReport) -> String {
    format!(
        "pushed {}, pulled {}, version {}",
        report.pushed, report.pulled, report.version
    )
}

fn create<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        let boxes = match inv.arg(2) {
            Some(text) => text.parse::<u32>().map_err(|_| {
                SampleError::InvalidArgument(format!("box count \"{text}\" is not a number"))
            })?,
            None => 1,
        };
        if boxes > scene::MAX_BOXES {
            return Err(SampleError::InvalidArgument(format!(
                "box count {boxes} is above the limit of {}",
                scene::MAX_BOXES
            )));
        }

        let mut doc = inv.ctx.client().create(&uri)?;
        let paths = scene::populate(doc.as_mut(), boxes)?;
        let report = doc.flush()?;
        inv.ctx.load_document(doc).await;
        inv.ctx.console().line(format!(
            "Created {uri} with {} boxes ({})",
            paths.len(),
            report_line(&report)
        ));
        Ok(())
    })
}

fn load<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        let doc = inv.ctx.client().open(&uri)?;
        let count = doc.prim_paths().len();
        inv.ctx.load_document(doc).await;
        inv.ctx
            .console()
            .line(format!("Loaded {uri} ({count} prims)"));
        Ok(())
    })
}

fn close<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.close_document().await?;
        inv.ctx.console().line(format!("Closed {uri}"));
        Ok(())
    })
}

fn prims<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let rows = inv
            .ctx
            .pump()
            .read(|doc| {
                doc.prim_paths()
                    .into_iter()
                    .map(|path| match doc.prim(&path) {
                        Some(prim) if !prim.type_name.is_empty() => {
                            format!("{path} [{}]", prim.type_name)
                        }
                        _ => path.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .await?;
        for row in rows {
            inv.ctx.console().line(row);
        }
        Ok(())
    })
}

fn get<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let path = prim_arg(&inv, 1)?;
        let property = inv.arg(2);
        let prim = inv
            .ctx
            .pump()
            .read(|doc| doc.prim(&path).cloned())
            .await?
            .ok_or_else(|| SampleError::PrimNotFound(path.to_string()))?;

        let console = inv.ctx.console();
        match property {
            Some(name) => {
                let value = prim.properties.get(name).ok_or_else(|| {
                    SampleError::NotFound(format!("property {name} on {path}"))
                })?;
                console.line(format!("{name} = {value}"));
            }
            None => {
                console.line(format!("{path} [{}]", prim.type_name));
                for (name, value) in &prim.properties {
                    console.line(format!("  {name} = {value}"));
                }
            }
        }
        Ok(())
    })
}

fn set<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let path = prim_arg(&inv, 1)?;
        let property = inv.require(2, "property")?;
        let raw = inv.require(3, "value")?;
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let ((), report) = inv
            .ctx
            .pump()
            .edit(|doc| doc.mutate(&path, property, value))
            .await?;
        inv.ctx.console().line(format!(
            "Set {path}.{property} ({})",
            report_line(&report)
        ));
        Ok(())
    })
}

/// First free sibling of `path` named `name`, `name_1`, `name_2`, ...
fn free_sibling(doc: &dyn LiveDocument, path: &PrimPath, name: &str) -> Result<PrimPath, SampleError> {
    let mut candidate = path.with_name(name)?;
    let mut suffix = 0_u32;
    while doc.prim(&candidate).is_some() {
        suffix += 1;
        candidate = path.with_name(&format!("{name}_{suffix}"))?;
    }
    Ok(candidate)
}

fn rename<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let path = prim_arg(&inv, 1)?;
        let name = valid_prim_name(inv.require(2, "new name")?);

        let (target, report) = inv
            .ctx
            .pump()
            .edit(|doc| {
                if doc.prim(&path).is_none() {
                    return Err(SampleError::PrimNotFound(path.to_string()));
                }
                if path.name() == name {
                    return Err(SampleError::InvalidArgument(format!("{path} is already named {name}")));
                }
                let target = free_sibling(doc, &path, &name)?;
                doc.rename_prim(&path, &target)?;
                Ok(target)
            })
            .await?;
        tracing::debug!(from = %path, to = %target, version = report.version, "prim renamed");
        inv.ctx
            .console()
            .line(format!("{path} renamed to: {}", target.name()));
        Ok(())
    })
}

fn flush<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let report = inv.ctx.pump().process().await?;
        inv.ctx
            .console()
            .line(format!("Flushed: {}", report_line(&report)));
        Ok(())
    })
}

fn transform<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let requested = inv.arg(1).map(PrimPath::parse).transpose()?;
        let angle = inv.ctx.next_angle();

        let ((path, (translate, rotate)), report) = inv
            .ctx
            .pump()
            .edit(|doc| {
                let path = match requested {
                    Some(path) if doc.prim(&path).is_some() => path,
                    _ => doc.first_mesh().ok_or_else(|| {
                        SampleError::PrimNotFound("no mesh in the document".to_string())
                    })?,
                };
                let step = scene::apply_transform(doc, &path, angle)?;
                Ok((path, step))
            })
            .await?;

        tracing::debug!(%path, angle, version = report.version, "transform applied");
        inv.ctx.console().line(format!(
            "Transformed {path}: translate {translate:?} rotate {rotate:?}"
        ));
        Ok(())
    })
}
