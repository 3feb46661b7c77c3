//! Admission, worker selection and priority-ordered draining
//!
//! The dispatcher keeps one backlog per worker slot. Each queue holds
//! three FIFO buckets (one per [`PriorityLevel`]) and a load counter that
//! always matches the buckets' combined length.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::DispatcherConfig;
use crate::policy::OverflowPolicy;
use crate::priority::PriorityLevel;
use crate::queue::WorkerQueue;
use crate::stats::DispatcherStats;

/// Dispatcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Invalid configuration
    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    /// `get_next` was called while nothing was queued for the scope
    #[error("no queued task for {}", scope_label(.worker))]
    EmptyQueue {
        /// Requested worker, `None` for the whole pool
        worker: Option<usize>,
    },

    /// A pinned or scoped worker index does not exist
    #[error("worker index {worker} out of range (pool has {worker_count} workers)")]
    WorkerOutOfRange {
        /// Requested index
        worker: usize,
        /// Number of workers in the pool
        worker_count: usize,
    },

    /// A load counter claims tasks that no bucket holds
    #[error("load counter out of sync for {}: load {load} but every bucket is empty", scope_label(.worker))]
    InvariantViolation {
        /// Offending worker, `None` when scanning the whole pool
        worker: Option<usize>,
        /// Load observed at the time
        load: usize,
    },
}

fn scope_label(worker: &Option<usize>) -> String {
    match worker {
        Some(index) => format!("worker {index}"),
        None => "any worker".to_string(),
    }
}

/// Outcome of [`Dispatcher::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Task was queued on this worker
    Admitted {
        /// Index of the receiving worker
        worker: usize,
    },

    /// Backlog limit was reached and the overflow policy declined the task
    Dropped,
}

impl Admission {
    /// Whether the task was queued
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Receiving worker, if admitted
    pub fn worker(&self) -> Option<usize> {
        match self {
            Self::Admitted { worker } => Some(*worker),
            Self::Dropped => None,
        }
    }
}

/// Priority-aware, load-balanced dispatcher for a fixed pool of workers
///
/// Holds opaque task handles of type `T`; it never inspects or runs them.
/// All operations are synchronous and complete in O(workers). For use from
/// several threads wrap it in a [`SharedDispatcher`](crate::SharedDispatcher).
///
/// # Example
///
/// ```
/// use workpool_dispatch::{AlwaysAdmit, Dispatcher, PriorityLevel};
///
/// let mut dispatcher = Dispatcher::new(2, 0, AlwaysAdmit).unwrap();
///
/// dispatcher.add("report", PriorityLevel::Low, None).unwrap();
/// dispatcher.add("click", PriorityLevel::High, None).unwrap();
///
/// assert_eq!(dispatcher.total_queued(), 2);
/// assert_eq!(dispatcher.get_next(None).unwrap(), "click");
/// ```
pub struct Dispatcher<T> {
    workers: Vec<WorkerQueue<T>>,
    max_queued: usize,
    policy: Arc<dyn OverflowPolicy>,
    admitted: u64,
    dropped: u64,
    dispatched: u64,
}

impl<T> Dispatcher<T> {
    /// Create a dispatcher with `worker_count` workers
    ///
    /// `max_queued` is the backlog size at which `policy` is consulted;
    /// 0 disables the limit.
    pub fn new<P>(
        worker_count: usize,
        max_queued: usize,
        policy: P,
    ) -> Result<Self, DispatchError>
    where
        P: OverflowPolicy + 'static,
    {
        Self::with_shared_policy(worker_count, max_queued, Arc::new(policy))
    }

    /// Create a dispatcher that shares a policy instance with other owners
    pub fn with_shared_policy(
        worker_count: usize,
        max_queued: usize,
        policy: Arc<dyn OverflowPolicy>,
    ) -> Result<Self, DispatchError> {
        if worker_count == 0 {
            return Err(DispatchError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }

        info!(worker_count, max_queued, "Dispatcher created");

        Ok(Self {
            workers: (0..worker_count).map(|_| WorkerQueue::new()).collect(),
            max_queued,
            policy,
            admitted: 0,
            dropped: 0,
            dispatched: 0,
        })
    }

    /// Create a dispatcher from configuration, using the built-in policy it names
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        debug!(policy = %config.overflow_policy, "Building dispatcher from config");
        Self::with_shared_policy(
            config.worker_count,
            config.max_queued,
            config.overflow_policy.build(),
        )
    }

    /// Offer a task for admission
    ///
    /// If the backlog limit is reached the overflow policy decides; a
    /// declined task is dropped and `Ok(Admission::Dropped)` returned with
    /// no other effect. Admitted tasks go to `worker` when given, otherwise
    /// to the least-loaded worker (lowest index on ties).
    pub fn add(
        &mut self,
        task: T,
        priority: PriorityLevel,
        worker: Option<usize>,
    ) -> Result<Admission, DispatchError> {
        if let Some(index) = worker {
            self.check_worker(index)?;
        }

        if self.at_limit() && !self.policy.continue_if_limit_exceeded() {
            self.dropped += 1;
            debug!(
                priority = %priority,
                total_queued = self.total_queued(),
                max_queued = self.max_queued,
                "Backlog limit reached, task dropped"
            );
            return Ok(Admission::Dropped);
        }

        let index = worker.unwrap_or_else(|| self.least_loaded());
        let queue = &mut self.workers[index];
        queue.push(task, priority);
        self.admitted += 1;

        trace!(
            worker = index,
            priority = %priority,
            pinned = worker.is_some(),
            load = queue.load(),
            "Task admitted"
        );

        Ok(Admission::Admitted { worker: index })
    }

    /// Offer a low-priority task to the least-loaded worker
    pub fn submit(&mut self, task: T) -> Result<Admission, DispatchError> {
        self.add(task, PriorityLevel::default(), None)
    }

    /// Whether `worker` (or, when `None`, any worker) has a queued task
    ///
    /// Unknown worker indexes have nothing queued.
    pub fn has_next(&self, worker: Option<usize>) -> bool {
        match worker {
            Some(index) => self.workers.get(index).is_some_and(|q| q.load() > 0),
            None => self.workers.iter().any(|q| q.load() > 0),
        }
    }

    /// Remove and return the next task in priority order
    ///
    /// Scoped to one worker: the head of its highest non-empty bucket.
    /// Unscoped: levels are scanned high to low and, within a level, workers
    /// by index; the first non-empty bucket found yields its head.
    ///
    /// Fails with [`DispatchError::EmptyQueue`] when [`has_next`](Self::has_next)
    /// is false for the same scope.
    pub fn get_next(&mut self, worker: Option<usize>) -> Result<T, DispatchError> {
        let (index, priority, task) = match worker {
            Some(index) => {
                self.check_worker(index)?;
                let queue = &mut self.workers[index];
                let load = queue.load();
                if load == 0 {
                    return Err(DispatchError::EmptyQueue { worker });
                }
                let (priority, task) = queue
                    .pop_next()
                    .ok_or(DispatchError::InvariantViolation { worker, load })?;
                (index, priority, task)
            }
            None => {
                if !self.has_next(None) {
                    return Err(DispatchError::EmptyQueue { worker });
                }
                let workers = &mut self.workers;
                let found = PriorityLevel::SCAN_ORDER.into_iter().find_map(|priority| {
                    workers.iter_mut().enumerate().find_map(|(index, queue)| {
                        queue.pop_at(priority).map(|task| (index, priority, task))
                    })
                });
                match found {
                    Some(hit) => hit,
                    None => {
                        return Err(DispatchError::InvariantViolation {
                            worker,
                            load: self.total_queued(),
                        })
                    }
                }
            }
        };

        self.dispatched += 1;
        trace!(
            worker = index,
            priority = %priority,
            load = self.workers[index].load(),
            "Task dispatched"
        );

        Ok(task)
    }

    /// Drop every queued task and reset every load counter
    pub fn clear(&mut self) {
        let discarded = self.total_queued();
        for queue in &mut self.workers {
            queue.clear();
        }
        info!(discarded, "Dispatcher cleared");
    }

    /// Global backlog: the sum of all worker loads
    pub fn total_queued(&self) -> usize {
        self.workers.iter().map(WorkerQueue::load).sum()
    }

    /// Whether nothing is queued anywhere
    pub fn is_empty(&self) -> bool {
        !self.has_next(None)
    }

    /// Current load of one worker
    pub fn load(&self, worker: usize) -> Option<usize> {
        self.workers.get(worker).map(WorkerQueue::load)
    }

    /// Number of worker slots
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Configured backlog limit (0 = unlimited)
    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    /// Whether every load counter matches its buckets
    pub fn is_consistent(&self) -> bool {
        self.workers.iter().all(WorkerQueue::is_consistent)
    }

    /// Snapshot of queue state and lifetime counters
    pub fn stats(&self) -> DispatcherStats {
        let mut queued_by_priority = [0; PriorityLevel::COUNT];
        for queue in &self.workers {
            for priority in PriorityLevel::SCAN_ORDER {
                queued_by_priority[priority.slot()] += queue.queued_at(priority);
            }
        }

        DispatcherStats {
            worker_loads: self.workers.iter().map(WorkerQueue::load).collect(),
            queued_by_priority,
            total_queued: self.total_queued(),
            max_queued: self.max_queued,
            admitted: self.admitted,
            dropped: self.dropped,
            dispatched: self.dispatched,
        }
    }

    fn at_limit(&self) -> bool {
        self.max_queued > 0 && self.total_queued() >= self.max_queued
    }

    /// Index of the least-loaded worker; the first minimum wins ties
    fn least_loaded(&self) -> usize {
        self.workers
            .iter()
            .enumerate()
            .min_by_key(|(_, queue)| queue.load())
            .map_or(0, |(index, _)| index)
    }

    fn check_worker(&self, worker: usize) -> Result<(), DispatchError> {
        if worker < self.workers.len() {
            Ok(())
        } else {
            Err(DispatchError::WorkerOutOfRange {
                worker,
                worker_count: self.workers.len(),
            })
        }
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "worker_loads",
                &self.workers.iter().map(WorkerQueue::load).collect::<Vec<_>>(),
            )
            .field("max_queued", &self.max_queued)
            .field("admitted", &self.admitted)
            .field("dropped", &self.dropped)
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AlwaysAdmit, RejectIncoming};

    fn with_loads(loads: &[usize]) -> Dispatcher<u32> {
        let mut dispatcher = Dispatcher::new(loads.len(), 0, AlwaysAdmit).unwrap();
        for (worker, &load) in loads.iter().enumerate() {
            for _ in 0..load {
                dispatcher.add(0, PriorityLevel::Low, Some(worker)).unwrap();
            }
        }
        dispatcher
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = Dispatcher::<u32>::new(0, 0, AlwaysAdmit);
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_least_loaded_picks_minimum() {
        let mut dispatcher = with_loads(&[3, 0, 2]);
        let admission = dispatcher.add(7, PriorityLevel::Low, None).unwrap();
        assert_eq!(admission, Admission::Admitted { worker: 1 });
        assert_eq!(dispatcher.load(1), Some(1));
    }

    #[test]
    fn test_least_loaded_ties_go_to_lowest_index() {
        let mut dispatcher = with_loads(&[1, 1, 2]);
        let admission = dispatcher.add(7, PriorityLevel::Low, None).unwrap();
        assert_eq!(admission.worker(), Some(0));
    }

    #[test]
    fn test_least_loaded_is_not_stuck_on_first_worker() {
        let mut dispatcher = with_loads(&[2, 2, 1]);
        assert_eq!(dispatcher.submit(7).unwrap().worker(), Some(2));
    }

    #[test]
    fn test_unpinned_adds_spread_evenly() {
        let mut dispatcher = Dispatcher::new(3, 0, AlwaysAdmit).unwrap();
        let workers: Vec<_> = (0..6)
            .map(|i| dispatcher.submit(i).unwrap().worker().unwrap())
            .collect();
        assert_eq!(workers, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_pinned_ignores_load() {
        let mut dispatcher = with_loads(&[0, 5]);
        let admission = dispatcher.add(7, PriorityLevel::High, Some(1)).unwrap();
        assert_eq!(admission.worker(), Some(1));
        assert_eq!(dispatcher.load(1), Some(6));
        assert_eq!(dispatcher.load(0), Some(0));
    }

    #[test]
    fn test_pinned_out_of_range() {
        let mut dispatcher = with_loads(&[0, 0]);
        let err = dispatcher.add(7, PriorityLevel::Low, Some(2)).unwrap_err();
        assert_eq!(
            err,
            DispatchError::WorkerOutOfRange {
                worker: 2,
                worker_count: 2
            }
        );
        assert_eq!(dispatcher.total_queued(), 0);
    }

    #[test]
    fn test_reject_incoming_drops_at_limit() {
        let mut dispatcher = Dispatcher::new(1, 2, RejectIncoming).unwrap();
        assert!(dispatcher.submit(1).unwrap().is_admitted());
        assert!(dispatcher.submit(2).unwrap().is_admitted());
        assert_eq!(dispatcher.submit(3).unwrap(), Admission::Dropped);
        assert_eq!(dispatcher.total_queued(), 2);

        // Room frees up once a task leaves
        dispatcher.get_next(None).unwrap();
        assert!(dispatcher.submit(4).unwrap().is_admitted());
    }

    #[test]
    fn test_always_admit_ignores_limit() {
        let mut dispatcher = Dispatcher::new(1, 1, AlwaysAdmit).unwrap();
        for i in 0..5 {
            assert!(dispatcher.submit(i).unwrap().is_admitted());
        }
        assert_eq!(dispatcher.total_queued(), 5);
    }

    #[test]
    fn test_policy_not_consulted_below_limit() {
        let mut dispatcher = Dispatcher::new(1, 3, || -> bool {
            panic!("policy consulted below limit")
        })
        .unwrap();
        dispatcher.submit(1).unwrap();
        dispatcher.submit(2).unwrap();
        dispatcher.submit(3).unwrap();
        assert_eq!(dispatcher.total_queued(), 3);
    }

    #[test]
    fn test_scoped_get_next_respects_priority() {
        let mut dispatcher = Dispatcher::new(1, 0, AlwaysAdmit).unwrap();
        dispatcher.add("low", PriorityLevel::Low, None).unwrap();
        dispatcher.add("mid", PriorityLevel::Mid, None).unwrap();
        dispatcher.add("high", PriorityLevel::High, None).unwrap();

        assert_eq!(dispatcher.get_next(Some(0)).unwrap(), "high");
        assert_eq!(dispatcher.get_next(Some(0)).unwrap(), "mid");
        assert_eq!(dispatcher.get_next(Some(0)).unwrap(), "low");
        assert!(!dispatcher.has_next(Some(0)));
    }

    #[test]
    fn test_unscoped_prefers_priority_over_worker_index() {
        let mut dispatcher = Dispatcher::new(2, 0, AlwaysAdmit).unwrap();
        dispatcher.add("w0-low", PriorityLevel::Low, Some(0)).unwrap();
        dispatcher.add("w1-high", PriorityLevel::High, Some(1)).unwrap();
        dispatcher.add("w1-low", PriorityLevel::Low, Some(1)).unwrap();

        assert_eq!(dispatcher.get_next(None).unwrap(), "w1-high");
        assert_eq!(dispatcher.get_next(None).unwrap(), "w0-low");
        assert_eq!(dispatcher.get_next(None).unwrap(), "w1-low");
    }

    #[test]
    fn test_scoped_get_next_on_idle_worker_fails() {
        let mut dispatcher = with_loads(&[1, 0]);
        assert_eq!(
            dispatcher.get_next(Some(1)).unwrap_err(),
            DispatchError::EmptyQueue { worker: Some(1) }
        );
        assert_eq!(dispatcher.load(0), Some(1));
    }

    #[test]
    fn test_get_next_out_of_range() {
        let mut dispatcher = with_loads(&[1]);
        assert!(matches!(
            dispatcher.get_next(Some(4)),
            Err(DispatchError::WorkerOutOfRange { worker: 4, .. })
        ));
        assert!(!dispatcher.has_next(Some(4)));
    }

    #[test]
    fn test_clear_keeps_lifetime_counters() {
        let mut dispatcher = Dispatcher::new(2, 1, RejectIncoming).unwrap();
        dispatcher.submit(1).unwrap();
        dispatcher.submit(2).unwrap();
        dispatcher.clear();

        let stats = dispatcher.stats();
        assert_eq!(stats.total_queued, 0);
        assert_eq!(stats.worker_loads, vec![0, 0]);
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.dropped, 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_stats_by_priority() {
        let mut dispatcher = Dispatcher::new(2, 0, AlwaysAdmit).unwrap();
        dispatcher.add(1, PriorityLevel::High, None).unwrap();
        dispatcher.add(2, PriorityLevel::Low, None).unwrap();
        dispatcher.add(3, PriorityLevel::Low, None).unwrap();
        dispatcher.get_next(None).unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.queued_by_priority, [0, 0, 2]);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.admitted, 3);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DispatchError::EmptyQueue { worker: None }.to_string(),
            "no queued task for any worker"
        );
        assert_eq!(
            DispatchError::EmptyQueue { worker: Some(3) }.to_string(),
            "no queued task for worker 3"
        );
    }

    #[test]
    fn test_debug_shows_loads() {
        let dispatcher = with_loads(&[2, 1]);
        let debug = format!("{dispatcher:?}");
        assert!(debug.contains("worker_loads: [2, 1]"));
    }
}
