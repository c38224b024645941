//! `watch`: load a document and print its content again after every
//! live update pulled from the server.

use tokio::time::Instant;

use super::{SampleCommand, StopReason, parse_timeout, wait_for_stop};
use crate::cli::{HandlerFuture, Invocation};
use crate::client::uri::Uri;
use crate::context::SampleContext;
use crate::error::SampleError;
use crate::session::Payload;

pub(super) fn commands() -> Vec<SampleCommand> {
    vec![
        SampleCommand::new("watch", watch)
            .args("<url> [timeout]")
            .about("Load a document and print it after every live update\nRuns until Ctrl-C unless a timeout in seconds is given"),
    ]
}

fn dump(ctx: &SampleContext, uri: &Uri) -> Result<(), SampleError> {
    let bytes = ctx.client().read(uri)?;
    ctx.console().line(Payload::sniff(&bytes).to_string());
    Ok(())
}

fn watch<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "url")?))?;
        let timeout = inv.arg(2).map(parse_timeout).transpose()?.flatten();
        let ctx = inv.ctx;

        let doc = ctx.client().open(&uri)?;
        let mut versions = ctx.pump().subscribe();
        ctx.load_document(doc).await;

        let console = ctx.console();
        console.line(format!("Watching {uri}"));
        dump(ctx, &uri)?;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut updates = 0_u64;
        let reason = loop {
            tokio::select! {
                changed = versions.changed() => {
                    if changed.is_err() {
                        break StopReason::Finished;
                    }
                    let version = *versions.borrow_and_update();
                    updates += 1;
                    console.line(format!("Update to {uri} (version {version})"));
                    dump(ctx, &uri)?;
                }
                reason = wait_for_stop(ctx, deadline, || false) => break reason,
            }
        };
        tracing::info!(%uri, ?reason, updates, "watch stopped");
        console.line(format!("Stopped watching {uri} after {updates} updates"));

        match reason {
            StopReason::ConnectionLost => Err(SampleError::Connection(
                "connection lost while watching".to_string(),
            )),
            _ => Ok(()),
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use crate::client::memory::MemoryServer;
    use crate::commands::testing::{Harness, eventually};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn remote_edits_are_printed_as_they_arrive() {
        let server = MemoryServer::new("localhost");
        let alice = Harness::new(&server, "alice");
        let bob = Harness::new(&server, "bob");
        alice.ok("create watched.live 1").await;

        let editor = async {
            assert!(eventually(|| bob.output.contents().contains("Watching ")).await);
            alice.ok("set /World/box_0 owner \"alice\"").await;
            assert!(eventually(|| bob.output.contents().contains("Update to ")).await);
            bob.ctx.interrupted().set();
        };
        let (status, ()) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(5), bob.run("watch watched.live")),
            editor
        );
        assert_eq!(status.ok(), Some(crate::cli::CommandStatus::Success));

        let out = bob.output.contents();
        assert!(out.starts_with("Watching memory://localhost/watched.live\n"), "{out}");
        let update = out.find("Update to memory://localhost/watched.live (version 2)");
        assert!(update.is_some(), "{out}");
        let after = out.get(update.unwrap_or_default()..).unwrap_or_default();
        assert!(after.contains("\"owner\": \"alice\""), "{out}");
        assert!(out.contains("Stopped watching memory://localhost/watched.live after 1 updates"));
        alice.ctx.shutdown().await;
        bob.ctx.shutdown().await;
    }

    #[tokio::test]
    async fn watch_needs_an_existing_document() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        assert!(h.fails("watch missing.live").await.starts_with("not found: "));
        assert!(h.fails("watch").await.ends_with("Usage: watch <url> [timeout]\n"));
        assert!(h.fails("watch missing.live soon").await.contains("not a number"));
    }

    #[tokio::test]
    async fn timeout_ends_a_quiet_watch() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        h.ok("create quiet.live 1").await;
        let out = h.ok("watch quiet.live 0").await;
        assert!(out.contains("/World/box_0"));
        assert!(out.ends_with("Stopped watching memory://localhost/quiet.live after 0 updates\n"));
    }
}
