//! Channel commands: join and leave a live-session channel, publish
//! messages and drive the presence and merge protocol.

use super::SampleCommand;
use crate::cli::{HandlerFuture, Invocation};
use crate::client::uri::Uri;
use crate::context::SampleContext;
use crate::error::SampleError;
use crate::session::MessageType;

pub(super) fn commands() -> Vec<SampleCommand> {
    vec![
        SampleCommand::new("join", join)
            .args("<url>")
            .about("Join a channel\nLeaves the current channel first"),
        SampleCommand::new("send", send)
            .args("<message>")
            .about("Send a message to the channel"),
        SampleCommand::new("leave", leave).about("Leave the channel"),
        SampleCommand::new("users", users).about("List the other users in the channel"),
        SampleCommand::new("getusers", get_users)
            .about("Ask every user in the channel to say hello"),
        SampleCommand::new("merge", merge)
            .about("Announce a merge and flush the loaded document\nEvery client in the channel exits"),
    ]
}

async fn require_joined(ctx: &SampleContext) -> Result<Uri, SampleError> {
    ctx.listener().channel().await.ok_or(SampleError::NotJoined)
}

fn join<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = inv.ctx.resolve(Some(inv.require(1, "channel url")?))?;
        let listener = inv.ctx.listener();
        let handle = listener.join(&uri).await?;
        listener.announce(MessageType::Join).await?;
        tracing::debug!(%uri, %handle, "joined");
        inv.ctx.console().line(format!("Joined channel {uri}"));
        Ok(())
    })
}

fn send<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        inv.require(1, "message")?;
        let message = inv.rest().join(" ");
        inv.ctx.listener().send(message.as_bytes()).await
    })
}

fn leave<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = require_joined(inv.ctx).await?;
        let listener = inv.ctx.listener();
        if let Err(e) = listener.announce(MessageType::Left).await {
            tracing::warn!(error = %e, "cannot announce leaving");
        }
        listener.leave().await;
        inv.ctx.console().line(format!("Left channel {uri}"));
        Ok(())
    })
}

fn users<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let uri = require_joined(inv.ctx).await?;
        let peers = inv.ctx.listener().peers();
        let console = inv.ctx.console();
        console.line(format!("Users in {uri}:"));
        if peers.is_empty() {
            console.line("  (nobody else)");
        }
        for peer in peers {
            console.line(format!("  {peer}"));
        }
        Ok(())
    })
}

fn get_users<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move { inv.ctx.listener().announce(MessageType::GetUsers).await })
}

fn merge<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let listener = inv.ctx.listener();
        listener.announce(MessageType::MergeStarted).await?;
        match inv.ctx.pump().process().await {
            Ok(report) => tracing::info!(version = report.version, "merged document flushed"),
            Err(SampleError::NoDocument) => {}
            Err(e) => return Err(e),
        }
        listener.announce(MessageType::MergeFinished).await
    })
}
