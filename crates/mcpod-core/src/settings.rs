//! Runtime tuning knobs and their validation.
//!
//! Pure domain types with no infrastructure dependencies. Adapters fill these
//! from CLI flags and environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default HTTP port of the gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 9887;

/// Default number of log lines returned when the caller gives none.
pub const DEFAULT_LOG_LINES: usize = 100;

/// Timeouts and retry budgets of the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Bound on waiting for a new workload to become addressable.
    pub provision_timeout_secs: u64,

    /// Delay before discovery talks to a freshly started pod.
    pub discovery_grace_ms: u64,

    /// Attempts per discovery step before giving up.
    pub discovery_attempts: u32,

    /// Base delay between discovery attempts; the n-th retry waits n times this.
    pub discovery_backoff_ms: u64,

    /// Idle bound on the stream bridge read loop.
    pub proxy_idle_timeout_secs: u64,

    /// How long a notification exchange waits for unsolicited frames.
    pub notification_idle_ms: u64,

    /// Age after which a `pending` installation is considered interrupted
    /// when the gateway starts.
    pub stale_pending_after_secs: u64,

    /// Interval of the pod health monitor.
    pub health_interval_secs: u64,

    /// Lines returned by the log endpoint when none are requested.
    pub default_log_lines: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            provision_timeout_secs: 60,
            discovery_grace_ms: 3_000,
            discovery_attempts: 3,
            discovery_backoff_ms: 1_000,
            proxy_idle_timeout_secs: 120,
            notification_idle_ms: 250,
            stale_pending_after_secs: 600,
            health_interval_secs: 15,
            default_log_lines: DEFAULT_LOG_LINES,
        }
    }
}

impl RuntimeSettings {
    pub const fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub const fn discovery_grace(&self) -> Duration {
        Duration::from_millis(self.discovery_grace_ms)
    }

    pub const fn discovery_backoff(&self) -> Duration {
        Duration::from_millis(self.discovery_backoff_ms)
    }

    pub const fn proxy_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_idle_timeout_secs)
    }

    pub const fn notification_idle(&self) -> Duration {
        Duration::from_millis(self.notification_idle_ms)
    }

    pub const fn stale_pending_after(&self) -> Duration {
        Duration::from_secs(self.stale_pending_after_secs)
    }

    pub const fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Settings with every wait shortened, for tests driving fake pods.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            provision_timeout_secs: 2,
            discovery_grace_ms: 10,
            discovery_attempts: 3,
            discovery_backoff_ms: 10,
            proxy_idle_timeout_secs: 2,
            notification_idle_ms: 50,
            stale_pending_after_secs: 600,
            health_interval_secs: 1,
            default_log_lines: DEFAULT_LOG_LINES,
        }
    }
}

/// Errors that can occur during settings validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("Discovery attempts must be between 1 and 20, got {0}")]
    InvalidDiscoveryAttempts(u32),

    #[error("Default log lines must be between 1 and 10000, got {0}")]
    InvalidLogLines(usize),
}

/// Validate runtime settings.
pub fn validate_settings(settings: &RuntimeSettings) -> Result<(), SettingsError> {
    let positive = [
        ("provision_timeout_secs", settings.provision_timeout_secs),
        ("proxy_idle_timeout_secs", settings.proxy_idle_timeout_secs),
        ("notification_idle_ms", settings.notification_idle_ms),
        ("health_interval_secs", settings.health_interval_secs),
    ];
    if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
        return Err(SettingsError::MustBePositive(name));
    }

    if !(1..=20).contains(&settings.discovery_attempts) {
        return Err(SettingsError::InvalidDiscoveryAttempts(
            settings.discovery_attempts,
        ));
    }

    if !(1..=10_000).contains(&settings.default_log_lines) {
        return Err(SettingsError::InvalidLogLines(settings.default_log_lines));
    }

    Ok(())
}
