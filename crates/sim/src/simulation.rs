// Simulated pool coordinator
// Decision: One consumer task per worker, each draining only its own slot
// Decision: Per-worker Notify so a wake-up for an idle worker is never lost

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use workpool_dispatch::{DispatcherConfig, DispatcherStats, PriorityLevel, SharedDispatcher};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a simulation run
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Tasks the producer offers
    pub tasks: usize,
    /// Probability that a task is pinned to a random worker
    pub pin_ratio: f64,
    /// Simulated execution time per task
    pub work_time: Duration,
    /// RNG seed; random when unset
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tasks: 1000,
            pin_ratio: 0.1,
            work_time: Duration::from_millis(1),
            seed: None,
        }
    }
}

impl SimConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let tasks = std::env::var("SIM_TASKS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.tasks);

        let pin_ratio = std::env::var("SIM_PIN_RATIO")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|r| r.is_finite())
            .map(|r| r.clamp(0.0, 1.0))
            .unwrap_or(defaults.pin_ratio);

        let work_time = std::env::var("SIM_WORK_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.work_time);

        let seed = std::env::var("SIM_SEED").ok().and_then(|s| s.parse().ok());

        Self {
            tasks,
            pin_ratio,
            work_time,
            seed,
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Handle the dispatcher carries for one simulated task
#[derive(Debug, Clone)]
pub struct SimTask {
    pub id: Uuid,
    pub priority: PriorityLevel,
    pub submitted_at: Instant,
}

/// What one worker got through
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub completed: u64,
    /// Completed tasks per level, in scan order (high, mid, low)
    pub completed_by_priority: [u64; 3],
    /// Mean time from submission to pickup
    pub mean_wait_ms: f64,
}

/// Result of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub produced: u64,
    pub admitted: u64,
    pub dropped: u64,
    pub elapsed_ms: u128,
    pub workers: Vec<WorkerReport>,
    pub dispatcher: DispatcherStats,
}

// =============================================================================
// Simulation
// =============================================================================

/// Producer plus one consumer per worker around a shared dispatcher
pub struct Simulation {
    dispatcher: SharedDispatcher<SimTask>,
    config: SimConfig,
    wakers: Vec<Arc<Notify>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl Simulation {
    /// Build the dispatcher and the per-worker wake-ups
    pub fn new(dispatch_config: &DispatcherConfig, config: SimConfig) -> Result<Self> {
        let dispatcher =
            SharedDispatcher::from_config(dispatch_config).context("Invalid dispatcher config")?;
        let wakers = (0..dispatcher.worker_count())
            .map(|_| Arc::new(Notify::new()))
            .collect();
        let (closed_tx, closed_rx) = watch::channel(false);

        Ok(Self {
            dispatcher,
            config,
            wakers,
            closed_tx,
            closed_rx,
        })
    }

    /// Handle to the underlying dispatcher
    pub fn dispatcher(&self) -> &SharedDispatcher<SimTask> {
        &self.dispatcher
    }

    /// Stop producing and discard whatever is still queued
    pub fn shutdown(&self) {
        warn!(
            remaining = self.dispatcher.total_queued(),
            "Shutting down, discarding backlog"
        );
        self.dispatcher.clear();
        self.close();
    }

    /// Produce every task, then wait for the workers to drain their backlog
    pub async fn run(&self) -> Result<SimReport> {
        let started = Instant::now();

        let consumers: Vec<JoinHandle<Result<WorkerReport>>> = (0..self.wakers.len())
            .map(|worker| {
                tokio::spawn(consume(
                    worker,
                    self.dispatcher.clone(),
                    self.wakers[worker].clone(),
                    self.closed_rx.clone(),
                    self.config.work_time,
                ))
            })
            .collect();

        let (produced, admitted, dropped) = self.produce().await?;
        self.close();

        let mut workers = Vec::with_capacity(consumers.len());
        for handle in consumers {
            workers.push(handle.await.context("Worker task panicked")??);
        }

        let report = SimReport {
            produced,
            admitted,
            dropped,
            elapsed_ms: started.elapsed().as_millis(),
            workers,
            dispatcher: self.dispatcher.stats(),
        };

        info!(
            produced = report.produced,
            admitted = report.admitted,
            dropped = report.dropped,
            elapsed_ms = report.elapsed_ms,
            "Simulation finished"
        );

        Ok(report)
    }

    async fn produce(&self) -> Result<(u64, u64, u64)> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let worker_count = self.wakers.len();
        let (mut produced, mut admitted, mut dropped) = (0, 0, 0);

        for _ in 0..self.config.tasks {
            if *self.closed_rx.borrow() {
                debug!("Producer stopping early");
                break;
            }

            let priority = PriorityLevel::SCAN_ORDER[rng.gen_range(0..PriorityLevel::COUNT)];
            let pinned = rng
                .gen_bool(self.config.pin_ratio)
                .then(|| rng.gen_range(0..worker_count));
            let task = SimTask {
                id: Uuid::now_v7(),
                priority,
                submitted_at: Instant::now(),
            };
            produced += 1;

            match self.dispatcher.add(task, priority, pinned)?.worker() {
                Some(worker) => {
                    admitted += 1;
                    self.wakers[worker].notify_one();
                }
                None => dropped += 1,
            }

            tokio::task::yield_now().await;
        }

        Ok((produced, admitted, dropped))
    }

    fn close(&self) {
        self.closed_tx.send_replace(true);
        for waker in &self.wakers {
            waker.notify_one();
        }
    }
}

/// Drain one worker's backlog until the simulation is closed and it is empty
async fn consume(
    worker: usize,
    dispatcher: SharedDispatcher<SimTask>,
    waker: Arc<Notify>,
    mut closed: watch::Receiver<bool>,
    work_time: Duration,
) -> Result<WorkerReport> {
    let mut report = WorkerReport {
        worker,
        ..Default::default()
    };
    let mut total_wait = Duration::ZERO;

    loop {
        match dispatcher.try_next(Some(worker))? {
            Some(task) => {
                total_wait += task.submitted_at.elapsed();
                debug!(worker, task_id = %task.id, priority = %task.priority, "Running task");
                tokio::time::sleep(work_time).await;
                report.completed += 1;
                report.completed_by_priority[task.priority.slot()] += 1;
            }
            None => {
                if *closed.borrow() {
                    break;
                }
                tokio::select! {
                    _ = waker.notified() => {}
                    _ = closed.changed() => {}
                }
            }
        }
    }

    if report.completed > 0 {
        report.mean_wait_ms = total_wait.as_secs_f64() * 1000.0 / report.completed as f64;
    }
    debug!(worker, completed = report.completed, "Worker idle, exiting");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use workpool_dispatch::OverflowPolicyKind;

    fn quick(tasks: usize) -> SimConfig {
        SimConfig {
            tasks,
            pin_ratio: 0.2,
            work_time: Duration::ZERO,
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn test_unlimited_run_completes_everything() {
        let sim = Simulation::new(&DispatcherConfig::new(4), quick(500)).unwrap();
        let report = sim.run().await.unwrap();

        assert_eq!(report.produced, 500);
        assert_eq!(report.admitted, 500);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.workers.iter().map(|w| w.completed).sum::<u64>(), 500);
        assert_eq!(report.dispatcher.total_queued, 0);
        assert_eq!(report.dispatcher.dispatched, 500);
    }

    #[tokio::test]
    async fn test_report_counts_agree_under_limit() {
        let config = DispatcherConfig::new(2)
            .with_max_queued(3)
            .with_overflow_policy(OverflowPolicyKind::RejectIncoming);
        let sim = Simulation::new(&config, quick(300)).unwrap();
        let report = sim.run().await.unwrap();

        assert_eq!(report.admitted + report.dropped, 300);
        assert_eq!(report.dispatcher.admitted, report.admitted);
        assert_eq!(report.dispatcher.dropped, report.dropped);
        assert_eq!(
            report.workers.iter().map(|w| w.completed).sum::<u64>(),
            report.admitted
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_run_discards_everything() {
        let sim = Simulation::new(&DispatcherConfig::new(2), quick(100)).unwrap();
        sim.shutdown();
        let report = sim.run().await.unwrap();

        assert_eq!(report.produced, 0);
        assert!(report.workers.iter().all(|w| w.completed == 0));
    }

    #[test]
    fn test_invalid_dispatcher_config() {
        assert!(Simulation::new(&DispatcherConfig::new(0), SimConfig::default()).is_err());
    }

    #[test]
    fn test_report_serializes() {
        let report = WorkerReport {
            worker: 1,
            completed: 3,
            completed_by_priority: [1, 1, 1],
            mean_wait_ms: 0.5,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["completed_by_priority"], serde_json::json!([1, 1, 1]));
    }
}
