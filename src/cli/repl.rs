//! The interactive read-eval-print loop.
//!
//! Each iteration checks the fatal, session-ending and interrupt flags,
//! prints the prompt and waits for a line. The wait races all three, so a
//! merge announced by another client, a lost connection or Ctrl-C ends the
//! loop without the user pressing enter.

use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;

use super::command::CommandRegistry;
use super::tokenizer::tokenize;
use crate::context::SampleContext;
use crate::error::SampleError;

/// Prompt printed before every line.
pub const PROMPT: &str = "> ";

/// Words that end the loop, matched case-insensitively.
pub const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    /// The user typed an exit word.
    Quit,
    /// Input reached end of file.
    EndOfInput,
    /// A merge notification ended the live session.
    SessionEnded,
    /// The user pressed Ctrl-C.
    Interrupted,
}

/// Returns `true` if `token` is one of [`EXIT_WORDS`].
#[must_use]
pub fn is_exit_word(token: &str) -> bool {
    EXIT_WORDS.iter().any(|w| w.eq_ignore_ascii_case(token))
}

/// Interactive loop over a command registry.
#[derive(Debug)]
pub struct Repl<'a> {
    registry: &'a CommandRegistry<SampleContext>,
    ctx: &'a SampleContext,
}

impl<'a> Repl<'a> {
    /// Creates a loop dispatching into `registry`.
    #[must_use]
    pub const fn new(registry: &'a CommandRegistry<SampleContext>, ctx: &'a SampleContext) -> Self {
        Self { registry, ctx }
    }

    /// Runs until an exit word, end of input, or a flag is raised.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] when the fatal flag is set, or
    /// [`SampleError::Io`] if reading input fails.
    pub async fn run<R>(&self, input: R) -> Result<ReplExit, SampleError>
    where
        R: AsyncBufRead + Unpin,
    {
        let console = self.ctx.console();
        let mut lines = input.lines();
        loop {
            if self.ctx.fatal().is_set() {
                return Err(SampleError::Connection(
                    "connection to the server was lost".to_string(),
                ));
            }
            if self.ctx.session_ending().is_set() {
                tracing::info!("live session ended by a merge");
                return Ok(ReplExit::SessionEnded);
            }
            if self.ctx.interrupted().is_set() {
                console.line("");
                return Ok(ReplExit::Interrupted);
            }

            console.prompt(PROMPT);
            let line = tokio::select! {
                line = lines.next_line() => line?,
                () = self.ctx.session_ending().wait() => continue,
                () = self.ctx.fatal().wait() => continue,
                () = self.ctx.interrupted().wait() => continue,
            };
            let Some(line) = line else {
                console.line("");
                return Ok(ReplExit::EndOfInput);
            };

            let tokens = tokenize(&line);
            let Some(first) = tokens.first() else {
                continue;
            };
            if is_exit_word(first) {
                return Ok(ReplExit::Quit);
            }
            let status = self.registry.run(self.ctx, &tokens, console).await;
            tracing::debug!(command = %first, ?status, "command finished");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::client::LiveClient;
    use crate::client::memory::MemoryServer;
    use crate::commands;
    use crate::console::{Console, ConsoleBuffer};
    use std::sync::Arc;

    fn context(server: &MemoryServer) -> (SampleContext, ConsoleBuffer) {
        let client: Arc<dyn LiveClient> = Arc::new(server.connect("alice", "test"));
        let (console, buffer) = Console::buffer();
        let config = commands::testing::config(server);
        (SampleContext::new(config, client, console), buffer)
    }

    fn registry() -> CommandRegistry<SampleContext> {
        let Ok(registry) = commands::registry() else {
            panic!("builtin registry must build");
        };
        registry
    }

    #[test]
    fn exit_words_ignore_case() {
        assert!(is_exit_word("quit"));
        assert!(is_exit_word("EXIT"));
        assert!(is_exit_word("Q"));
        assert!(!is_exit_word("quitter"));
    }

    #[tokio::test]
    async fn help_badcmd_quit() {
        let server = MemoryServer::new("localhost");
        let (ctx, output) = context(&server);
        let registry = registry();
        let input: &[u8] = b"help\nbadcmd\nquit\nhelp\n";

        let exit = Repl::new(&registry, &ctx).run(input).await;
        assert_eq!(exit.ok(), Some(ReplExit::Quit));

        let text = output.contents();
        assert!(text.starts_with(PROMPT));
        for command in registry.commands().iter().filter(|c| !c.is_hidden()) {
            assert!(text.contains(&format!("  {}", command.usage())), "{}", command.name());
        }
        assert!(text.contains("Unknown command \"badcmd\":  Type \"help\" to list available commands."));
        assert_eq!(text.matches(" : Print this help").count(), 1);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn end_of_input_ends_the_loop() {
        let server = MemoryServer::new("localhost");
        let (ctx, _) = context(&server);
        let registry = registry();
        let input: &[u8] = b"\n   \n";
        let exit = Repl::new(&registry, &ctx).run(input).await;
        assert_eq!(exit.ok(), Some(ReplExit::EndOfInput));
    }

    #[tokio::test]
    async fn raised_flags_end_the_loop() {
        let server = MemoryServer::new("localhost");
        let (ctx, _) = context(&server);
        let registry = registry();

        ctx.session_ending().set();
        let exit = Repl::new(&registry, &ctx).run(&b"help\n"[..]).await;
        assert_eq!(exit.ok(), Some(ReplExit::SessionEnded));

        server.set_online(false);
        let exit = Repl::new(&registry, &ctx).run(&b"help\n"[..]).await;
        assert!(matches!(exit, Err(SampleError::Connection(_))));
    }

    #[tokio::test]
    async fn flag_interrupts_a_pending_read() {
        let server = MemoryServer::new("localhost");
        let (ctx, _) = context(&server);
        let registry = registry();
        let (reader, _writer) = tokio::io::duplex(64);
        let input = tokio::io::BufReader::new(reader);

        let ending = ctx.session_ending().clone();
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            ending.set();
        });
        let exit = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            Repl::new(&registry, &ctx).run(input),
        )
        .await;
        assert_eq!(exit.ok().and_then(Result::ok), Some(ReplExit::SessionEnded));
        assert!(trigger.await.is_ok());
    }

    #[tokio::test]
    async fn ctrl_c_quits_a_waiting_prompt() {
        let server = MemoryServer::new("localhost");
        let (ctx, output) = context(&server);
        let registry = registry();
        let (reader, _writer) = tokio::io::duplex(64);

        let interrupted = ctx.interrupted().clone();
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            interrupted.set();
        });
        let exit = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            Repl::new(&registry, &ctx).run(tokio::io::BufReader::new(reader)),
        )
        .await;
        assert_eq!(exit.ok().and_then(Result::ok), Some(ReplExit::Interrupted));
        assert_eq!(output.contents(), format!("{PROMPT}\n"));
        assert!(trigger.await.is_ok());
    }
}
