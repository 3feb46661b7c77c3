//! Point-in-time dispatcher statistics

use serde::{Deserialize, Serialize};

/// Snapshot of dispatcher state and lifetime counters
///
/// Lifetime counters (`admitted`, `dropped`, `dispatched`) survive
/// [`Dispatcher::clear`](crate::Dispatcher::clear); the queue figures do not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Current load of each worker, by index
    pub worker_loads: Vec<usize>,

    /// Tasks waiting at each level, in scan order (high, mid, low)
    pub queued_by_priority: [usize; 3],

    /// Sum of all worker loads
    pub total_queued: usize,

    /// Configured backlog limit (0 = unlimited)
    pub max_queued: usize,

    /// Tasks accepted into a bucket
    pub admitted: u64,

    /// Tasks dropped by the overflow policy
    pub dropped: u64,

    /// Tasks handed out by `get_next`
    pub dispatched: u64,
}

impl DispatcherStats {
    /// Fraction of the backlog limit in use, if a limit is set
    pub fn utilization(&self) -> Option<f64> {
        (self.max_queued > 0).then(|| self.total_queued as f64 / self.max_queued as f64)
    }

    /// Difference between the busiest and idlest worker
    pub fn imbalance(&self) -> usize {
        let max = self.worker_loads.iter().copied().max().unwrap_or(0);
        let min = self.worker_loads.iter().copied().min().unwrap_or(0);
        max - min
    }
}
