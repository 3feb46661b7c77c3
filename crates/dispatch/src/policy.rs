//! Overflow policies for backpressure
//!
//! A policy is consulted only when a backlog limit is configured and the
//! backlog has already reached it. It answers one question: admit this task
//! anyway, or drop it?

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Decides whether to admit a task once the backlog limit is reached
///
/// Returning `true` treats the limit as advisory and admits the task.
/// Returning `false` drops it without enqueueing anything.
///
/// Any `Fn() -> bool` closure is a policy as well:
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use workpool_dispatch::OverflowPolicy;
///
/// let draining = Arc::new(AtomicBool::new(false));
/// let flag = draining.clone();
/// let policy = move || !flag.load(Ordering::Relaxed);
///
/// assert!(policy.continue_if_limit_exceeded());
/// draining.store(true, Ordering::Relaxed);
/// assert!(!policy.continue_if_limit_exceeded());
/// ```
pub trait OverflowPolicy: Send + Sync {
    /// Whether to admit a task although the backlog limit is reached
    fn continue_if_limit_exceeded(&self) -> bool;
}

impl<F> OverflowPolicy for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn continue_if_limit_exceeded(&self) -> bool {
        self()
    }
}

/// Never rejects; the backlog limit is only advisory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysAdmit;

impl OverflowPolicy for AlwaysAdmit {
    fn continue_if_limit_exceeded(&self) -> bool {
        true
    }
}

/// Strict backpressure: drops every task while the backlog is at the limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectIncoming;

impl OverflowPolicy for RejectIncoming {
    fn continue_if_limit_exceeded(&self) -> bool {
        false
    }
}

/// Built-in policy selector, used by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyKind {
    /// [`AlwaysAdmit`]
    #[default]
    AlwaysAdmit,

    /// [`RejectIncoming`]
    RejectIncoming,
}

impl OverflowPolicyKind {
    /// Instantiate the policy this kind names
    pub fn build(self) -> Arc<dyn OverflowPolicy> {
        match self {
            Self::AlwaysAdmit => Arc::new(AlwaysAdmit),
            Self::RejectIncoming => Arc::new(RejectIncoming),
        }
    }
}

impl fmt::Display for OverflowPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysAdmit => write!(f, "always_admit"),
            Self::RejectIncoming => write!(f, "reject_incoming"),
        }
    }
}

/// Error returned when parsing an unknown policy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown overflow policy: {0} (expected always_admit or reject_incoming)")]
pub struct ParsePolicyError(String);

impl FromStr for OverflowPolicyKind {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always_admit" | "admit" => Ok(Self::AlwaysAdmit),
            "reject_incoming" | "reject" => Ok(Self::RejectIncoming),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}
