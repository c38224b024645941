//! Sample error types with exit-status mapping.
//!
//! [`SampleError`] is the central error type of the crate. Every variant
//! belongs to an [`ErrorKind`] which decides whether the failure is
//! reported and the loop continues, or whether the process must stop.

use crate::cli::CommandStatus;

/// Coarse classification of a [`SampleError`].
///
/// | Kind              | Policy                                         |
/// |-------------------|------------------------------------------------|
/// | `Connection`      | Fatal: the sample process shuts down           |
/// | `NotFound`        | Reported, the REPL keeps going                 |
/// | `InvalidArgument` | Reported with a usage line, the REPL continues |
/// | `TransientServer` | Reported; retries belong to the client         |
/// | `Internal`        | Reported                                       |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The content server could not be reached.
    Connection,
    /// A command, prim, document or channel does not exist.
    NotFound,
    /// The caller supplied malformed or missing arguments.
    InvalidArgument,
    /// The server rejected a request in a way that may succeed later.
    TransientServer,
    /// Anything else.
    Internal,
}

/// Error enum shared by the dispatcher, the pump, the listener and the
/// client backends.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// The server is unreachable or the URL scheme is not served.
    #[error("connection error: {0}")]
    Connection(String),

    /// A document, folder or channel was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A prim path does not exist in the loaded document.
    #[error("prim not found: {0}")]
    PrimNotFound(String),

    /// The command name is not registered.
    #[error("Unknown command \"{0}\":  Type \"help\" to list available commands.")]
    UnknownCommand(String),

    /// Argument validation failed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A command that needs a loaded document ran without one.
    #[error("no document loaded")]
    NoDocument,

    /// A command that needs a joined channel ran without one.
    #[error("not in a channel")]
    NotJoined,

    /// The server answered with a retryable failure.
    #[error("server error: {0}")]
    TransientServer(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Console or stdin failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SampleError {
    /// Returns the [`ErrorKind`] for this variant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::NotFound(_) | Self::PrimNotFound(_) | Self::UnknownCommand(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidArgument(_) | Self::NoDocument | Self::NotJoined => {
                ErrorKind::InvalidArgument
            }
            Self::TransientServer(_) => ErrorKind::TransientServer,
            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if the error must terminate the sample process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection)
    }

    /// Every error maps to a failing command status.
    #[must_use]
    pub const fn status(&self) -> CommandStatus {
        CommandStatus::Failure
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn connection_is_the_only_fatal_kind() {
        assert!(SampleError::Connection("offline".to_string()).is_fatal());
        assert!(!SampleError::NotFound("x".to_string()).is_fatal());
        assert!(!SampleError::InvalidArgument("x".to_string()).is_fatal());
        assert!(!SampleError::TransientServer("busy".to_string()).is_fatal());
        assert!(!SampleError::NoDocument.is_fatal());
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            SampleError::UnknownCommand("x".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SampleError::PrimNotFound("/World".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(SampleError::NotJoined.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            SampleError::Internal("x".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn unknown_command_message_has_hint() {
        let msg = SampleError::UnknownCommand("badcmd".to_string()).to_string();
        assert!(msg.contains("\"badcmd\""));
        assert!(msg.contains("help"));
    }

    #[test]
    fn status_is_failure() {
        assert_eq!(SampleError::NoDocument.status(), CommandStatus::Failure);
    }
}
