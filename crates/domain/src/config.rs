//! Command handling configuration loaded from environment variables.

use std::time::Duration;

/// Tuning for [`CommandHandler`](crate::CommandHandler) and
/// [`Repository`](crate::Repository).
///
/// Reads from environment variables:
/// - `COMMAND_MAX_ATTEMPTS`: attempts per update command on concurrency conflict (default: `3`)
/// - `STORE_TIMEOUT_MS`: bound on every event store call (default: `5000`)
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub max_attempts: u32,
    pub store_timeout: Duration,
}

impl HandlerConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("COMMAND_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_attempts),
            store_timeout: std::env::var("STORE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            store_timeout: Duration::from_millis(5000),
        }
    }
}
