//! `help`, `quit`, `log` and `cver`.

use super::SampleCommand;
use crate::cli::{HandlerFuture, Invocation};
use crate::context::SampleContext;
use crate::error::SampleError;
use crate::logging::LogLevel;

pub(super) fn commands() -> Vec<SampleCommand> {
    vec![
        SampleCommand::new("help", help).about("Print this help"),
        SampleCommand::new("--help", help),
        SampleCommand::new("-h", help),
        SampleCommand::new("-?", help),
        SampleCommand::new("/?", help),
        SampleCommand::new("?", help),
        SampleCommand::new("quit", quit).about("Exit the program"),
        SampleCommand::new("exit", quit),
        SampleCommand::new("q", quit),
        SampleCommand::new("log", log)
            .args("<level>")
            .about("Set the log level\nd[ebug], v[erbose], i[nfo], w[arning] or e[rror]"),
        SampleCommand::new("cver", cver).about("Print the client version"),
    ]
}

fn help<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        inv.ctx
            .console()
            .line(inv.registry.help_text().trim_end_matches('\n'));
        Ok(())
    })
}

// The REPL handles exit words itself; in one-shot mode there is nothing to
// leave.
fn quit<'a>(_inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move { Ok(()) })
}

fn log<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let level: LogLevel = inv.require(1, "log level")?.parse()?;
        let handle = inv.ctx.log_handle().ok_or_else(|| {
            SampleError::Internal("logging is not managed by this process".to_string())
        })?;
        handle.set_level(level)?;
        inv.ctx.console().line(format!("Log level set to {level}"));
        Ok(())
    })
}

fn cver<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        inv.ctx.console().line(format!(
            "Client version: {} ({} {})",
            inv.ctx.client().version(),
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use crate::client::memory::MemoryServer;
    use crate::commands::testing::Harness;

    #[tokio::test]
    async fn help_aliases_print_the_same_listing() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        let listing = h.ok("help").await;
        assert!(listing.contains(" : Print this help\n"));
        assert!(listing.contains("d[ebug], v[erbose]"));
        assert!(!listing.contains("  --help"));
        for alias in ["--help", "-h", "-?", "/?", "?", "HELP"] {
            assert_eq!(h.ok(alias).await, listing, "{alias}");
        }
    }

    #[tokio::test]
    async fn log_validates_the_level() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        let out = h.fails("log loud").await;
        assert!(out.contains("unknown log level \"loud\""));
        assert!(out.ends_with("Usage: log <level>\n"));
        assert!(h.fails("log").await.contains("missing log level"));
        // No subscriber was installed by the test harness.
        assert!(h.fails("log d").await.contains("not managed"));
    }

    #[tokio::test]
    async fn quit_and_cver_succeed() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        assert_eq!(h.ok("quit").await, "");
        assert!(h.ok("cver").await.starts_with("Client version: memory-client"));
    }
}
