//! connect-samples entry point.
//!
//! With arguments, runs a single command and exits with its status.
//! Without, starts the interactive loop on stdin.
//!
//! Ctrl-C is caught once here and raises the context's interrupt latch;
//! the loop and long-running commands stop on it. A second Ctrl-C exits
//! immediately.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::BufReader;

use connect_samples::cli::{CommandStatus, Repl, ReplExit};
use connect_samples::client::LiveClient;
use connect_samples::client::memory::MemoryServer;
use connect_samples::commands;
use connect_samples::config::SampleConfig;
use connect_samples::console::Console;
use connect_samples::context::SampleContext;
use connect_samples::live::Latch;
use connect_samples::logging;

/// Exit status after a second Ctrl-C, as a shell reports SIGINT.
const INTERRUPT_EXIT: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "connect-samples failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let config = SampleConfig::from_env().context("loading configuration")?;
    let log = logging::init(&config.log_level, config.log_json)
        .context("initialising logging")?;
    tracing::info!(server = %config.server_url, user = %config.user_name, "starting connect-samples");

    let server = MemoryServer::new(config.server_url.host());
    let client: Arc<dyn LiveClient> =
        Arc::new(server.connect(&config.user_name, &config.app_name));
    let ctx = SampleContext::new(config, client, Console::stdout()).with_log_handle(log);
    let registry = commands::registry().context("building the command table")?;
    let ctrl_c = tokio::spawn(forward_ctrl_c(ctx.interrupted().clone()));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let status = if args.is_empty() {
        let exit = Repl::new(&registry, &ctx)
            .run(BufReader::new(tokio::io::stdin()))
            .await;
        match exit {
            Ok(ReplExit::SessionEnded) => {
                tracing::info!("live session ended by another client");
                CommandStatus::Success
            }
            Ok(ReplExit::Interrupted) => {
                tracing::info!("interrupted, shutting down");
                CommandStatus::Success
            }
            Ok(reason) => {
                tracing::info!(?reason, "interactive loop finished");
                CommandStatus::Success
            }
            Err(e) => {
                ctx.console().line(e.to_string());
                CommandStatus::Failure
            }
        }
    } else {
        registry.run(&ctx, &args, ctx.console()).await
    };

    ctx.shutdown().await;
    ctrl_c.abort();
    if ctx.fatal().is_set() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(status.into())
}

async fn forward_ctrl_c(interrupted: Latch) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            return;
        }
        if interrupted.is_set() {
            tracing::warn!("second Ctrl-C, exiting");
            std::process::exit(INTERRUPT_EXIT);
        }
        tracing::info!("Ctrl-C received");
        interrupted.set();
    }
}
