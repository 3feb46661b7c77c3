//! Thread-safe dispatcher handle
//!
//! Every call takes one lock around the whole dispatcher and holds it for the
//! duration of the operation, so admission and draining on the same worker
//! are linearizable and no caller ever sees a load counter that disagrees
//! with its buckets.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DispatcherConfig;
use crate::dispatcher::{Admission, DispatchError, Dispatcher};
use crate::priority::PriorityLevel;
use crate::stats::DispatcherStats;

/// Cloneable, lock-guarded handle to a [`Dispatcher`]
///
/// # Example
///
/// ```
/// use std::thread;
/// use workpool_dispatch::{DispatcherConfig, PriorityLevel, SharedDispatcher};
///
/// let dispatcher = SharedDispatcher::from_config(&DispatcherConfig::new(2)).unwrap();
///
/// let producer = dispatcher.clone();
/// thread::spawn(move || {
///     for job in 0..10 {
///         producer.add(job, PriorityLevel::Mid, None).unwrap();
///     }
/// })
/// .join()
/// .unwrap();
///
/// let mut drained = 0;
/// while let Some(_job) = dispatcher.try_next(Some(0)).unwrap() {
///     drained += 1;
/// }
/// assert_eq!(drained, 5);
/// ```
pub struct SharedDispatcher<T> {
    inner: Arc<Mutex<Dispatcher<T>>>,
}

impl<T> Clone for SharedDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedDispatcher<T> {
    /// Wrap an existing dispatcher
    pub fn new(dispatcher: Dispatcher<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dispatcher)),
        }
    }

    /// Build a dispatcher from configuration and wrap it
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        Dispatcher::from_config(config).map(Self::new)
    }

    /// See [`Dispatcher::add`]
    pub fn add(
        &self,
        task: T,
        priority: PriorityLevel,
        worker: Option<usize>,
    ) -> Result<Admission, DispatchError> {
        self.inner.lock().add(task, priority, worker)
    }

    /// See [`Dispatcher::submit`]
    pub fn submit(&self, task: T) -> Result<Admission, DispatchError> {
        self.inner.lock().submit(task)
    }

    /// See [`Dispatcher::has_next`]
    pub fn has_next(&self, worker: Option<usize>) -> bool {
        self.inner.lock().has_next(worker)
    }

    /// See [`Dispatcher::get_next`]
    ///
    /// With several consumers on the same scope, prefer
    /// [`try_next`](Self::try_next): another consumer may empty the scope
    /// between a `has_next` check and this call.
    pub fn get_next(&self, worker: Option<usize>) -> Result<T, DispatchError> {
        self.inner.lock().get_next(worker)
    }

    /// Check and take the next task under a single lock acquisition
    ///
    /// Returns `Ok(None)` when nothing is queued for the scope.
    pub fn try_next(&self, worker: Option<usize>) -> Result<Option<T>, DispatchError> {
        let mut dispatcher = self.inner.lock();
        if !dispatcher.has_next(worker) {
            if let Some(index) = worker {
                if index >= dispatcher.worker_count() {
                    return Err(DispatchError::WorkerOutOfRange {
                        worker: index,
                        worker_count: dispatcher.worker_count(),
                    });
                }
            }
            return Ok(None);
        }
        dispatcher.get_next(worker).map(Some)
    }

    /// See [`Dispatcher::clear`]
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// See [`Dispatcher::total_queued`]
    pub fn total_queued(&self) -> usize {
        self.inner.lock().total_queued()
    }

    /// See [`Dispatcher::load`]
    pub fn load(&self, worker: usize) -> Option<usize> {
        self.inner.lock().load(worker)
    }

    /// See [`Dispatcher::worker_count`]
    pub fn worker_count(&self) -> usize {
        self.inner.lock().worker_count()
    }

    /// See [`Dispatcher::stats`]
    pub fn stats(&self) -> DispatcherStats {
        self.inner.lock().stats()
    }

    /// Run `f` with exclusive access to the dispatcher
    ///
    /// Useful for batching several operations under one lock.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut Dispatcher<T>) -> R) -> R {
        let mut dispatcher = self.inner.lock();
        f(&mut *dispatcher)
    }
}

impl<T> From<Dispatcher<T>> for SharedDispatcher<T> {
    fn from(dispatcher: Dispatcher<T>) -> Self {
        Self::new(dispatcher)
    }
}
