use crate::config::{get_namespaced_bool_or, get_namespaced_f64_or, get_namespaced_i64_or};
use crate::error::Error;
use ::config::Config;
use std::time::Duration;

/// Backoff and attempt limits for reconnecting.
///
/// A round tries every URI in the pool once. After a failed round the
/// transport sleeps for the current delay, then multiplies it by
/// `backoff_multiplier` (when exponential backoff is on), capped at
/// `max_delay`. A successful connection resets the delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
    pub backoff_multiplier: f64,
    /// Failed rounds allowed after a connection was lost. `None` is unbounded.
    pub max_reconnect_attempts: Option<u32>,
    /// Failed rounds allowed before the first connection. `None` is unbounded.
    pub startup_max_reconnect_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(30_000),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            max_reconnect_attempts: None,
            startup_max_reconnect_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Reads the policy from the `failover` namespace.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let ns = super::CONFIG_NAMESPACE;
        let defaults = Self::default();

        let millis = |key: &str, default: Duration| -> Result<Duration, Error> {
            let value = get_namespaced_i64_or(config, ns, key, default.as_millis() as i64)?;
            u64::try_from(value)
                .map(Duration::from_millis)
                .map_err(|_| Error::InvalidParameter {
                    key: key.to_string(),
                    value: value.to_string(),
                })
        };
        let attempts = |key: &str| -> Result<Option<u32>, Error> {
            let value = get_namespaced_i64_or(config, ns, key, -1)?;
            match value {
                -1 => Ok(None),
                n => u32::try_from(n).map(Some).map_err(|_| Error::InvalidParameter {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        };

        let backoff_multiplier =
            get_namespaced_f64_or(config, ns, "backOffMultiplier", defaults.backoff_multiplier)?;
        if !(backoff_multiplier >= 1.0 && backoff_multiplier.is_finite()) {
            return Err(Error::InvalidParameter {
                key: "backOffMultiplier".into(),
                value: backoff_multiplier.to_string(),
            });
        }

        let max_reconnect_attempts = attempts("maxReconnectAttempts")?;
        let startup_max_reconnect_attempts =
            attempts("startupMaxReconnectAttempts")?.or(max_reconnect_attempts);

        Ok(Self {
            initial_delay: millis("initialReconnectDelay", defaults.initial_delay)?,
            max_delay: millis("maxReconnectDelay", defaults.max_delay)?,
            use_exponential_backoff: get_namespaced_bool_or(
                config,
                ns,
                "useExponentialBackOff",
                defaults.use_exponential_backoff,
            )?,
            backoff_multiplier,
            max_reconnect_attempts,
            startup_max_reconnect_attempts,
        })
    }

    /// The delay to use after `current` once another round has failed.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if !self.use_exponential_backoff {
            return current;
        }
        // Products too large for a Duration saturate at the cap.
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Failed rounds allowed before giving up.
    pub fn attempt_limit(&self, ever_connected: bool) -> Option<u32> {
        if ever_connected {
            self.max_reconnect_attempts
        } else {
            self.startup_max_reconnect_attempts
        }
    }
}
