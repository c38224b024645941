//! Tracing setup with a runtime-adjustable level.
//!
//! The filter sits behind a `reload` layer so the `log` command can swap it
//! while the process runs. Records go to stderr, leaving stdout to the
//! console.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt as tracing_fmt, reload};

use crate::error::SampleError;

/// Level names accepted by the `log` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// `debug` or `d`.
    Debug,
    /// `verbose` or `v`; maps to `trace`.
    Verbose,
    /// `info` or `i`.
    Info,
    /// `warning` or `w`.
    Warning,
    /// `error` or `e`.
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Verbose => "trace",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "d" => Ok(Self::Debug),
            "verbose" | "v" => Ok(Self::Verbose),
            "info" | "i" => Ok(Self::Info),
            "warning" | "w" => Ok(Self::Warning),
            "error" | "e" => Ok(Self::Error),
            other => Err(SampleError::InvalidArgument(format!(
                "unknown log level \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive())
    }
}

/// Handle used to change the active filter.
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle").finish_non_exhaustive()
    }
}

impl LogHandle {
    /// Replaces the active filter with `level`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Internal`] if the subscriber is gone.
    pub fn set_level(&self, level: LogLevel) -> Result<(), SampleError> {
        self.handle
            .reload(EnvFilter::new(level.directive()))
            .map_err(|e| SampleError::Internal(format!("cannot change log level: {e}")))?;
        tracing::info!(%level, "log level changed");
        Ok(())
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
///
/// # Errors
///
/// Returns [`SampleError::Internal`] if a global subscriber is already set.
pub fn init(default_level: &str, json: bool) -> Result<LogHandle, SampleError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let (filter, handle) = reload::Layer::new(filter);

    let text = (!json).then(|| tracing_fmt::layer().with_writer(std::io::stderr));
    let structured = json.then(|| tracing_fmt::layer().json().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .map_err(|e| SampleError::Internal(format!("cannot install tracing subscriber: {e}")))?;

    Ok(LogHandle { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_and_abbreviations() {
        for (text, level) in [
            ("debug", LogLevel::Debug),
            ("D", LogLevel::Debug),
            ("verbose", LogLevel::Verbose),
            ("v", LogLevel::Verbose),
            ("Info", LogLevel::Info),
            ("w", LogLevel::Warning),
            ("warning", LogLevel::Warning),
            ("e", LogLevel::Error),
        ] {
            assert_eq!(text.parse::<LogLevel>().ok(), Some(level), "{text}");
        }
        assert_eq!(LogLevel::Verbose.directive(), "trace");
    }

    #[test]
    fn unknown_level_is_invalid_argument() {
        assert!(matches!(
            "loud".parse::<LogLevel>(),
            Err(SampleError::InvalidArgument(_))
        ));
    }
}
