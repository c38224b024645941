//! Command table and dispatch.
//!
//! A [`CommandRegistry`] is an ordered list of [`Command`]s built once at
//! startup. Lookup is a case-insensitive linear scan; the first token of a
//! line names the command and the whole token list is handed to its
//! handler. Commands without a description are hidden aliases: they
//! dispatch normally but are not listed by [`CommandRegistry::help_text`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::CommandStatus;
use crate::console::Console;
use crate::error::SampleError;

/// Separator between the `name args` column and the description.
const DIVIDER: &str = " : ";

/// Indentation of every help line.
const INDENT: &str = "  ";

/// Result of a command handler.
pub type CommandResult = Result<(), SampleError>;

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = CommandResult> + Send + 'a>>;

/// Handler function of a command.
pub type Handler<C> = for<'a> fn(Invocation<'a, C>) -> HandlerFuture<'a>;

/// Everything a handler gets to see for one call.
pub struct Invocation<'a, C> {
    /// Shared application context.
    pub ctx: &'a C,
    /// The registry the command was found in.
    pub registry: &'a CommandRegistry<C>,
    /// All tokens, command name first.
    pub args: &'a [String],
}

impl<C> Clone for Invocation<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Invocation<'_, C> {}

impl<C> fmt::Debug for Invocation<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl<'a, C> Invocation<'a, C> {
    /// Token at `index`; index 0 is the command name as typed.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).map(String::as_str)
    }

    /// Token at `index`, or [`SampleError::InvalidArgument`] naming what is
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if there are fewer tokens.
    pub fn require(&self, index: usize, what: &str) -> Result<&'a str, SampleError> {
        self.arg(index)
            .ok_or_else(|| SampleError::InvalidArgument(format!("missing {what}")))
    }

    /// Tokens after the command name.
    #[must_use]
    pub fn rest(&self) -> &'a [String] {
        self.args.get(1..).unwrap_or_default()
    }
}

/// One registered command.
pub struct Command<C> {
    name: &'static str,
    args: Option<&'static str>,
    description: Option<&'static str>,
    handler: Handler<C>,
}

impl<C> fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<C> Command<C> {
    /// Creates a hidden command with no arguments.
    #[must_use]
    pub const fn new(name: &'static str, handler: Handler<C>) -> Self {
        Self {
            name,
            args: None,
            description: None,
            handler,
        }
    }

    /// Sets the human-readable argument synopsis, e.g. `<url> [boxes]`.
    #[must_use]
    pub const fn args(mut self, args: &'static str) -> Self {
        self.args = Some(args);
        self
    }

    /// Sets the help description, making the command visible. A `\n`
    /// continues the description on an aligned second line.
    #[must_use]
    pub const fn about(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    /// Command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Argument synopsis.
    #[must_use]
    pub const fn synopsis(&self) -> Option<&'static str> {
        self.args
    }

    /// Help description.
    #[must_use]
    pub const fn description(&self) -> Option<&'static str> {
        self.description
    }

    /// Returns `true` for aliases that are not listed in help.
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.description.is_none()
    }

    /// `name args` as shown in help and usage lines.
    #[must_use]
    pub fn usage(&self) -> String {
        match self.args {
            Some(args) => format!("{} {args}", self.name),
            None => self.name.to_string(),
        }
    }

    /// Width of the `name args` column this command asks for.
    fn column_width(&self) -> usize {
        self.name.len() + self.args.map_or(0, str::len) + 1
    }
}

/// Ordered command table.
pub struct CommandRegistry<C> {
    commands: Vec<Command<C>>,
}

impl<C> fmt::Debug for CommandRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.commands.iter().map(|c| c.name))
            .finish()
    }
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<C> CommandRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from commands in display order.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Internal`] on a duplicate name.
    pub fn from_commands(commands: impl IntoIterator<Item = Command<C>>) -> Result<Self, SampleError> {
        let mut registry = Self::new();
        for command in commands {
            registry.register(command)?;
        }
        Ok(registry)
    }

    /// Appends a command.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Internal`] if a command with the same name
    /// (ignoring case) is already registered.
    pub fn register(&mut self, command: Command<C>) -> Result<(), SampleError> {
        if self.find(command.name).is_some() {
            return Err(SampleError::Internal(format!(
                "duplicate command \"{}\"",
                command.name
            )));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Case-insensitive exact lookup.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Command<C>> {
        self.commands
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// All commands in registration order.
    #[must_use]
    pub fn commands(&self) -> &[Command<C>] {
        &self.commands
    }

    /// Formats the help listing of every visible command.
    ///
    /// The `name args` column is padded to the widest entry of the whole
    /// table, hidden aliases included.
    #[must_use]
    pub fn help_text(&self) -> String {
        let width = self
            .commands
            .iter()
            .map(Command::column_width)
            .max()
            .unwrap_or(0);
        let continuation = INDENT.len() + width + DIVIDER.len();

        let mut out = String::new();
        for command in &self.commands {
            let Some(description) = command.description else {
                continue;
            };
            let mut lines = description.split('\n');
            let first = lines.next().unwrap_or_default();
            out.push_str(&format!(
                "{INDENT}{:<width$}{DIVIDER}{first}\n",
                command.usage()
            ));
            for line in lines {
                out.push_str(&format!("{:continuation$}{}\n", "", line.trim_start()));
            }
        }
        out
    }

    /// Looks up and runs the command named by `tokens[0]`.
    ///
    /// An empty token list is a successful no-op.
    ///
    /// # Errors
    ///
    /// [`SampleError::UnknownCommand`] if nothing matches, otherwise
    /// whatever the handler returns.
    pub async fn dispatch(&self, ctx: &C, tokens: &[String]) -> CommandResult {
        let Some(name) = tokens.first() else {
            return Ok(());
        };
        let Some(command) = self.find(name) else {
            return Err(SampleError::UnknownCommand(name.clone()));
        };
        tracing::debug!(command = command.name, argc = tokens.len(), "dispatch");
        (command.handler)(Invocation {
            ctx,
            registry: self,
            args: tokens,
        })
        .await
    }

    /// Dispatches and reports failures on `console`.
    pub async fn run(&self, ctx: &C, tokens: &[String], console: &Console) -> CommandStatus {
        match self.dispatch(ctx, tokens).await {
            Ok(()) => CommandStatus::Success,
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(error = %e, "command failed");
                } else {
                    tracing::debug!(error = %e, "command failed");
                }
                console.line(e.to_string());
                if let (SampleError::InvalidArgument(_), Some(command)) =
                    (&e, tokens.first().and_then(|name| self.find(name)))
                {
                    console.line(format!("Usage: {}", command.usage()));
                }
                e.status()
            }
        }
    }
}
