//! Sample configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key is optional.
//!
//! | Variable                       | Default               |
//! |--------------------------------|-----------------------|
//! | `SAMPLES_SERVER_URL`           | `memory://localhost/` |
//! | `SAMPLES_USER`                 | `$USER` or `sample`   |
//! | `SAMPLES_APP_NAME`             | `connect-samples`     |
//! | `SAMPLES_LOG_LEVEL`            | `warn`                |
//! | `SAMPLES_LOG_JSON`             | `false`               |
//! | `SAMPLES_LIVE_PERIOD_MS`       | `16`                  |
//! | `SAMPLES_SENSOR_PERIOD_MS`     | `300`                 |
//! | `SAMPLES_TIMEOUT_POLL_SECS`    | `5`                   |
//! | `SAMPLES_EVENT_QUEUE_CAPACITY` | `256`                 |

use std::time::Duration;

use crate::client::uri::Uri;
use crate::error::SampleError;

/// Top-level sample configuration.
///
/// Loaded once at startup via [`SampleConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SampleConfig {
    /// Base URL every relative path resolves against.
    pub server_url: Uri,

    /// User name announced to channel peers.
    pub user_name: String,

    /// Application name announced to channel peers.
    pub app_name: String,

    /// Initial tracing filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit log records as JSON lines instead of human-readable text.
    pub log_json: bool,

    /// Tick period of background live-update workers.
    pub live_period: Duration,

    /// Tick period of sensor workers.
    pub sensor_period: Duration,

    /// How often timeout loops look at the wall clock.
    pub timeout_poll: Duration,

    /// Capacity of the bounded channel-event queue.
    pub event_queue_capacity: usize,
}

impl SampleConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if `SAMPLES_SERVER_URL`
    /// is set but is not an absolute `scheme://host/path` URL.
    pub fn from_env() -> Result<Self, SampleError> {
        dotenvy::dotenv().ok();

        let server_url = Uri::parse(
            &std::env::var("SAMPLES_SERVER_URL")
                .unwrap_or_else(|_| "memory://localhost/".to_string()),
        )?;

        let defaults = Self::new(server_url);
        Ok(Self {
            user_name: std::env::var("SAMPLES_USER")
                .or_else(|_| std::env::var("USER"))
                .unwrap_or(defaults.user_name),
            app_name: std::env::var("SAMPLES_APP_NAME").unwrap_or(defaults.app_name),
            log_level: std::env::var("SAMPLES_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: parse_env_bool("SAMPLES_LOG_JSON", defaults.log_json),
            live_period: parse_env_millis("SAMPLES_LIVE_PERIOD_MS", defaults.live_period),
            sensor_period: parse_env_millis("SAMPLES_SENSOR_PERIOD_MS", defaults.sensor_period),
            timeout_poll: Duration::from_secs(parse_env(
                "SAMPLES_TIMEOUT_POLL_SECS",
                defaults.timeout_poll.as_secs(),
            )),
            event_queue_capacity: parse_env(
                "SAMPLES_EVENT_QUEUE_CAPACITY",
                defaults.event_queue_capacity,
            )
            .max(1),
            ..defaults
        })
    }

    /// Default settings for a client of `server_url`.
    #[must_use]
    pub fn new(server_url: Uri) -> Self {
        Self {
            server_url,
            user_name: "sample".to_string(),
            app_name: "connect-samples".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            live_period: Duration::from_millis(16),
            sensor_period: Duration::from_millis(300),
            timeout_poll: Duration::from_secs(5),
            event_queue_capacity: 256,
        }
    }
}

fn parse_env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a boolean environment variable (`1`/`true`/`yes`/`on`).
fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map_or(default, |v| {
        matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}
