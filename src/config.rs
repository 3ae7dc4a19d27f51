//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// Prefix for environment variable overrides (`TURNSTILE_RATE_LIMITING__MAX_REQUESTS`).
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sliding window parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the trailing window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Admissions allowed per client inside one window
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Reclaimer period in milliseconds; the window length when unset
    #[serde(default)]
    pub cleanup_interval_ms: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            cleanup_interval_ms: None,
        }
    }
}

fn default_window_ms() -> u64 {
    1000
}

fn default_max_requests() -> usize {
    3
}

impl RateLimitingConfig {
    /// Build a configuration from a window and quota.
    ///
    /// The window must be a whole number of milliseconds.
    pub fn new(window: Duration, max_requests: usize) -> Result<Self> {
        Ok(Self {
            window_ms: whole_millis(window).ok_or(TurnstileError::InvalidWindow)?,
            max_requests,
            cleanup_interval_ms: None,
        })
    }

    /// Builder-style: run the reclaimer on its own period.
    ///
    /// The period must be a whole number of milliseconds.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Result<Self> {
        self.cleanup_interval_ms =
            Some(whole_millis(interval).ok_or(TurnstileError::InvalidCleanupInterval)?);
        Ok(self)
    }

    /// The window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// The reclaimer period as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.unwrap_or(self.window_ms))
    }

    /// Reject configurations that cannot limit anything.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::InvalidWindow);
        }
        if self.max_requests == 0 {
            return Err(TurnstileError::InvalidMaxRequests);
        }
        if self.cleanup_interval_ms == Some(0) {
            return Err(TurnstileError::InvalidCleanupInterval);
        }
        Ok(())
    }
}

/// Millisecond count of `duration`, or `None` if it has a sub-millisecond
/// remainder or does not fit in a `u64`.
fn whole_millis(duration: Duration) -> Option<u64> {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        return None;
    }
    u64::try_from(duration.as_millis()).ok()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of the human-readable format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Layer an optional YAML file under `TURNSTILE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
