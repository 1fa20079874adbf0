//! World and tick loop configuration.
//!
//! Every option has a default and can be overridden from the environment:
//!
//! | env var                          | default |
//! |----------------------------------|---------|
//! | `ENGINE_NAMESPACE`               | `world` |
//! | `ENGINE_RECEIPT_HISTORY_SIZE`    | `10`    |
//! | `ENGINE_MESSAGE_EXPIRATION_SECS` | `10`    |
//! | `ENGINE_REPLAY_CACHE_KB`         | `1024`  |
//! | `ENGINE_VERIFY_SIGNATURES`       | `true`  |

use std::str::FromStr;
use std::time::Duration;

/// Default world namespace.
pub const DEFAULT_NAMESPACE: &str = "world";

pub const NAMESPACE_ENV: &str = "ENGINE_NAMESPACE";
pub const RECEIPT_HISTORY_SIZE_ENV: &str = "ENGINE_RECEIPT_HISTORY_SIZE";
pub const MESSAGE_EXPIRATION_ENV: &str = "ENGINE_MESSAGE_EXPIRATION_SECS";
pub const REPLAY_CACHE_KB_ENV: &str = "ENGINE_REPLAY_CACHE_KB";
pub const VERIFY_SIGNATURES_ENV: &str = "ENGINE_VERIFY_SIGNATURES";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Configuration for a [`crate::World`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    /// Namespace transactions must target.
    pub namespace: String,
    /// Number of trailing ticks whose receipts are retained.
    pub receipt_history_size: u64,
    /// Transactions older than this are stale; also the replay window.
    pub message_expiration: Duration,
    /// Replay cache capacity in KiB.
    pub replay_cache_kb: usize,
    /// Whether submissions must pass signature verification.
    pub verify_signatures: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            receipt_history_size: 10,
            message_expiration: Duration::from_secs(10),
            replay_cache_kb: 1024,
            verify_signatures: true,
        }
    }
}

impl WorldConfig {
    /// Defaults overridden by any `ENGINE_*` variables that are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a variable that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`WorldConfig::from_env`] but reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a variable that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(namespace) = lookup(NAMESPACE_ENV) {
            if namespace.is_empty() {
                return Err(ConfigError::Invalid {
                    var: NAMESPACE_ENV,
                    value: namespace,
                });
            }
            config.namespace = namespace;
        }
        if let Some(size) = parse(&lookup, RECEIPT_HISTORY_SIZE_ENV)? {
            config.receipt_history_size = size;
        }
        if let Some(secs) = parse(&lookup, MESSAGE_EXPIRATION_ENV)? {
            config.message_expiration = Duration::from_secs(secs);
        }
        if let Some(kb) = parse(&lookup, REPLAY_CACHE_KB_ENV)? {
            config.replay_cache_kb = kb;
        }
        if let Some(value) = lookup(VERIFY_SIGNATURES_ENV) {
            config.verify_signatures = match value.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: VERIFY_SIGNATURES_ENV,
                        value,
                    });
                }
            };
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_receipt_history_size(mut self, ticks: u64) -> Self {
        self.receipt_history_size = ticks;
        self
    }

    #[must_use]
    pub fn with_message_expiration(mut self, expiration: Duration) -> Self {
        self.message_expiration = expiration;
        self
    }

    #[must_use]
    pub fn with_replay_cache_kb(mut self, kb: usize) -> Self {
        self.replay_cache_kb = kb;
        self
    }

    #[must_use]
    pub fn with_verify_signatures(mut self, verify: bool) -> Self {
        self.verify_signatures = verify;
        self
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Configuration for the [`crate::TickLoop`] driver.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Interval between ticks.
    #[must_use]
    pub fn period(&self) -> Duration {
        if self.tick_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.tick_rate)
        } else {
            Duration::from_secs(1)
        }
    }
}
