//! Priority levels for dequeue ordering

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheduling class of a task
///
/// The order is fixed: `High > Mid > Low`. Workers always drain every
/// `High` task before touching `Mid`, and every `Mid` task before `Low`.
/// Within one level tasks leave in the order they arrived.
///
/// The levels are coarse classes (interactive, batch, background) rather
/// than numeric priorities.
///
/// # Example
///
/// ```
/// use workpool_dispatch::PriorityLevel;
///
/// assert!(PriorityLevel::High > PriorityLevel::Mid);
/// assert_eq!(PriorityLevel::default(), PriorityLevel::Low);
/// assert_eq!("mid".parse::<PriorityLevel>().unwrap(), PriorityLevel::Mid);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    /// Background work, drained last
    #[default]
    Low,

    /// Batch work
    Mid,

    /// Interactive work, drained first
    High,
}

impl PriorityLevel {
    /// Number of priority levels
    pub const COUNT: usize = 3;

    /// All levels in dequeue scan order (highest first)
    pub const SCAN_ORDER: [PriorityLevel; Self::COUNT] =
        [PriorityLevel::High, PriorityLevel::Mid, PriorityLevel::Low];

    /// Position of this level in [`SCAN_ORDER`](Self::SCAN_ORDER)
    pub const fn slot(self) -> usize {
        match self {
            Self::High => 0,
            Self::Mid => 1,
            Self::Low => 2,
        }
    }

    /// Lowercase name, as used in config and logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Mid => "mid",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown priority name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority level: {0} (expected high, mid or low)")]
pub struct ParsePriorityError(String);

impl FromStr for PriorityLevel {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "mid" | "medium" => Ok(Self::Mid),
            "low" => Ok(Self::Low),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}
