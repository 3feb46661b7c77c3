//! Dispatcher configuration

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dispatcher::DispatchError;
use crate::policy::OverflowPolicyKind;

/// Dispatcher configuration
///
/// # Example
///
/// ```
/// use workpool_dispatch::{DispatcherConfig, OverflowPolicyKind};
///
/// let config = DispatcherConfig::new(8)
///     .with_max_queued(1_000)
///     .with_overflow_policy(OverflowPolicyKind::RejectIncoming);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of worker slots; fixed for the dispatcher's lifetime
    pub worker_count: usize,

    /// Backlog size at which the overflow policy is consulted (0 = unlimited)
    #[serde(default)]
    pub max_queued: usize,

    /// Policy applied once `max_queued` is reached
    #[serde(default)]
    pub overflow_policy: OverflowPolicyKind,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queued: 0,
            overflow_policy: OverflowPolicyKind::AlwaysAdmit,
        }
    }
}

impl DispatcherConfig {
    /// Create a configuration for `worker_count` workers with no backlog limit
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// - `DISPATCH_WORKER_COUNT` (default 4)
    /// - `DISPATCH_MAX_QUEUED` (default 0, unlimited)
    /// - `DISPATCH_OVERFLOW_POLICY` (`always_admit` or `reject_incoming`)
    ///
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_count: env_or("DISPATCH_WORKER_COUNT", defaults.worker_count),
            max_queued: env_or("DISPATCH_MAX_QUEUED", defaults.max_queued),
            overflow_policy: env_or("DISPATCH_OVERFLOW_POLICY", defaults.overflow_policy),
        }
    }

    /// Set the number of workers
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the backlog limit (0 = unlimited)
    pub fn with_max_queued(mut self, max: usize) -> Self {
        self.max_queued = max;
        self
    }

    /// Set the overflow policy
    pub fn with_overflow_policy(mut self, policy: OverflowPolicyKind) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Whether a backlog limit is configured
    pub fn is_limited(&self) -> bool {
        self.max_queued > 0
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.worker_count == 0 {
            return Err(DispatchError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_or<V>(key: &str, default: V) -> V
where
    V: std::str::FromStr,
    V::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(key, value = %raw, error = %e, "Ignoring invalid setting, using default");
            default
        }),
        Err(_) => default,
    }
}
