//! Built-in commands of the sample client.
//!
//! Each submodule contributes a group of commands in display order;
//! [`registry`] assembles them into the table used by both the REPL and
//! one-shot mode.

pub mod channel;
pub mod files;
pub mod sensor;
pub mod stage;
pub mod system;
pub mod watch;

use std::time::Duration;

use tokio::time::Instant;

use crate::cli::{Command, CommandRegistry};
use crate::context::SampleContext;
use crate::error::SampleError;

/// Command type used throughout the sample.
pub type SampleCommand = Command<SampleContext>;

/// Builds the full command table.
///
/// # Errors
///
/// Returns [`SampleError::Internal`] if two groups register the same name.
pub fn registry() -> Result<CommandRegistry<SampleContext>, SampleError> {
    CommandRegistry::from_commands(
        system::commands()
            .into_iter()
            .chain(files::commands())
            .chain(stage::commands())
            .chain(channel::commands())
            .chain(sensor::commands())
            .chain(watch::commands()),
    )
}

/// Why a long-running command stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Timeout,
    Interrupted,
    SessionEnded,
    ConnectionLost,
    Finished,
}

/// Parses a timeout argument in seconds; `-1` means no deadline.
fn parse_timeout(text: &str) -> Result<Option<Duration>, SampleError> {
    match text.parse::<i64>() {
        Ok(-1) => Ok(None),
        Ok(secs) => u64::try_from(secs)
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| {
                SampleError::InvalidArgument(format!("timeout must be -1 or at least 0, got {secs}"))
            }),
        Err(_) => Err(SampleError::InvalidArgument(format!(
            "timeout \"{text}\" is not a number"
        ))),
    }
}

/// Waits for the deadline, Ctrl-C, a process flag or `finished`. Looks at
/// the clock at least every `timeout_poll`.
async fn wait_for_stop(
    ctx: &SampleContext,
    deadline: Option<Instant>,
    finished: impl Fn() -> bool,
) -> StopReason {
    let poll = ctx.config().timeout_poll;
    loop {
        if ctx.fatal().is_set() {
            return StopReason::ConnectionLost;
        }
        if ctx.session_ending().is_set() {
            return StopReason::SessionEnded;
        }
        if ctx.interrupted().is_set() {
            return StopReason::Interrupted;
        }
        if finished() {
            return StopReason::Finished;
        }
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return StopReason::Timeout;
                }
                poll.min(remaining)
            }
            None => poll,
        };

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = ctx.session_ending().wait() => {}
            () = ctx.fatal().wait() => {}
            () = ctx.interrupted().wait() => {}
        }
    }
}


#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn every_group_registers_without_clashes() {
        let Ok(registry) = registry() else {
            panic!("builtin registry must build");
        };
        for name in [
            "help", "--help", "?", "quit", "exit", "log", "cver", "list", "ls", "dir", "stat",
            "cat", "copy", "cp", "del", "rm", "cd", "push", "popd", "create", "load", "close",
            "prims", "get", "set", "flush", "transform", "join", "send", "leave", "users",
            "getusers", "merge", "sensor", "mkdir", "move", "mv", "rename", "r", "watch",
        ] {
            assert!(registry.find(name).is_some(), "{name}");
        }
        assert_eq!(registry.commands().first().map(Command::name), Some("help"));
    }

    #[test]
    fn timeout_accepts_minus_one_and_seconds() {
        assert_eq!(parse_timeout("-1").ok(), Some(None));
        assert_eq!(parse_timeout("0").ok(), Some(Some(Duration::ZERO)));
        assert_eq!(parse_timeout("30").ok(), Some(Some(Duration::from_secs(30))));
        assert!(matches!(parse_timeout("-2"), Err(SampleError::InvalidArgument(_))));
        assert!(matches!(parse_timeout("soon"), Err(SampleError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn ctrl_c_latch_stops_an_unbounded_wait() {
        let server = crate::client::memory::MemoryServer::new("localhost");
        let h = testing::Harness::new(&server, "alice");
        let latch = h.ctx.interrupted().clone();
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            latch.set();
        });
        let reason = tokio::time::timeout(
            Duration::from_secs(2),
            wait_for_stop(&h.ctx, None, || false),
        )
        .await;
        assert_eq!(reason.ok(), Some(StopReason::Interrupted));
        assert!(trigger.await.is_ok());

        let deadline = Some(Instant::now());
        assert_eq!(wait_for_stop(&h.ctx, deadline, || true).await, StopReason::Interrupted);
    }

    #[tokio::test]
    async fn deadline_and_finish_end_the_wait() {
        let server = crate::client::memory::MemoryServer::new("localhost");
        let h = testing::Harness::new(&server, "alice");
        let soon = Some(Instant::now() + Duration::from_millis(30));
        assert_eq!(wait_for_stop(&h.ctx, soon, || false).await, StopReason::Timeout);
        assert_eq!(wait_for_stop(&h.ctx, None, || true).await, StopReason::Finished);
    }
}
