//! Command-line surface: tokenizer, command table and the interactive
//! loop.

pub mod command;
pub mod repl;
pub mod tokenizer;

pub use command::{Command, CommandRegistry, CommandResult, Handler, HandlerFuture, Invocation};
pub use repl::{Repl, ReplExit};
pub use tokenizer::{escape, tokenize};

/// Outcome of one command, mapped onto a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Exit code 0.
    Success,
    /// Exit code 1.
    Failure,
}

impl CommandStatus {
    /// Process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }

    /// Returns `true` for [`CommandStatus::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<CommandStatus> for std::process::ExitCode {
    fn from(status: CommandStatus) -> Self {
        Self::from(status.code())
    }
}
