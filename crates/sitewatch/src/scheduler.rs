//! Periodic sweeps over every registered target.

use crate::executor::{CheckExecutor, CheckOutcome};
use crate::types::TargetId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Callback receiving the report of every scheduled sweep
pub type SweepListener = Arc<dyn Fn(&SweepReport) + Send + Sync>;

/// Summary of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Targets in the snapshot the sweep started from
    pub dispatched: usize,

    /// Per-target outcomes of the checks that completed
    pub outcomes: Vec<(TargetId, CheckOutcome)>,

    /// Checks whose target was deleted mid-flight
    pub discarded: usize,

    /// Wall time from dispatch to the last check finishing
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn changed(&self) -> usize {
        self.count(|o| *o == CheckOutcome::Changed)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| !o.is_success())
    }

    fn count(&self, pred: impl Fn(&CheckOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Monitoring scheduler - runs a full sweep every `interval`.
///
/// A sweep checks every target concurrently and waits for all of them. The
/// next tick is only awaited after the sweep drains, so an overrunning
/// sweep delays the next one instead of overlapping it.
pub struct Scheduler {
    executor: Arc<CheckExecutor>,
    interval: Duration,
    listener: Option<SweepListener>,
    stop_signal: Arc<Notify>,
}

impl Scheduler {
    pub fn new(executor: Arc<CheckExecutor>, interval: Duration) -> Self {
        Self {
            executor,
            interval,
            listener: None,
            stop_signal: Arc::new(Notify::new()),
        }
    }

    pub fn with_listener(mut self, listener: SweepListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check every target in a fresh snapshot and wait for all of them.
    pub async fn run_sweep(&self) -> SweepReport {
        let start = Instant::now();
        let snapshot = self.executor.registry().list().await;

        let mut report = SweepReport {
            dispatched: snapshot.len(),
            ..SweepReport::default()
        };

        let mut checks = JoinSet::new();
        for target in snapshot {
            let executor = self.executor.clone();
            checks.spawn(async move { executor.check_target(target).await });
        }

        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok(Some((target, outcome))) => report.outcomes.push((target.id, outcome)),
                Ok(None) => report.discarded += 1,
                Err(e) => error!(error = %e, "Check task failed"),
            }
        }

        report.elapsed = start.elapsed();
        info!(
            dispatched = report.dispatched,
            completed = report.completed(),
            changed = report.changed(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis(),
            "Completed sweep"
        );
        report
    }

    /// Start the periodic loop. The first sweep runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = scheduler.interval.as_secs(), "Monitoring scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = scheduler.run_sweep().await;
                        if let Some(listener) = &scheduler.listener {
                            listener(&report);
                        }
                    }
                    _ = scheduler.stop_signal.notified() => {
                        info!("Monitoring scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the periodic loop once any in-flight sweep has drained
    pub fn stop(&self) {
        self.stop_signal.notify_one();
    }
}
