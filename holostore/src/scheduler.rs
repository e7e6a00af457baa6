use crate::errors::{CacheError, Result};
use crate::models::{BatchReport, ChainId, RegistryKind};
use crate::signal::ShutdownSignal;
use crate::sync::ReconciliationWorker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    RunningCycle,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub batches: Vec<BatchReport>,
    /// Registries whose address list could not be fetched this cycle.
    pub unreachable: Vec<String>,
}

impl CycleReport {
    pub fn updated(&self) -> usize {
        self.batches.iter().map(|b| b.updated).sum()
    }

    pub fn storage_failures(&self) -> usize {
        self.batches.iter().map(|b| b.storage_failures).sum()
    }

    /// A cycle that hit the store and got nothing written.
    pub fn is_storage_failed(&self) -> bool {
        self.storage_failures() > 0 && self.updated() == 0
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    /// A cycle was already running; this tick was dropped.
    Skipped,
    Completed(CycleReport),
}

/// Resets the scheduler to `Idle` however the cycle ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives full-registry reconciliation on a fixed interval, one cycle at a time.
pub struct PollingScheduler {
    worker: Arc<ReconciliationWorker>,
    targets: Vec<(ChainId, RegistryKind)>,
    interval: Duration,
    max_failed_cycles: u32,
    running: AtomicBool,
    last_cycle: Mutex<Option<CycleReport>>,
}

impl PollingScheduler {
    pub fn new(
        worker: Arc<ReconciliationWorker>,
        chains: &[ChainId],
        interval: Duration,
        max_failed_cycles: u32,
    ) -> Self {
        let targets = chains
            .iter()
            .flat_map(|chain| {
                RegistryKind::all()
                    .into_iter()
                    .map(move |registry| (chain.clone(), registry))
            })
            .collect();
        Self {
            worker,
            targets,
            interval,
            max_failed_cycles,
            running: AtomicBool::new(false),
            last_cycle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::RunningCycle
        } else {
            SchedulerState::Idle
        }
    }

    pub fn targets(&self) -> &[(ChainId, RegistryKind)] {
        &self.targets
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.lock().ok().and_then(|guard| guard.clone())
    }

    /// Runs one full cycle unless one is already in progress.
    pub async fn tick(&self, shutdown: &ShutdownSignal) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Reconciliation cycle still running; dropping tick");
            return TickOutcome::Skipped;
        }
        let _guard = CycleGuard(&self.running);

        let started_at = Utc::now();
        let mut batches = Vec::with_capacity(self.targets.len());
        let mut unreachable = Vec::new();
        for (chain, registry) in &self.targets {
            if shutdown.is_stopped() {
                break;
            }
            // One registry scan in flight per node.
            match self.worker.reconcile_registry(chain, *registry, shutdown).await {
                Ok(report) => batches.push(report),
                Err(err) => {
                    log::error!("Could not reconcile {} registry on {}: {}", registry, chain, err);
                    unreachable.push(format!("{chain}/{registry}"));
                }
            }
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            batches,
            unreachable,
        };
        if let Ok(mut last) = self.last_cycle.lock() {
            *last = Some(report.clone());
        }
        TickOutcome::Completed(report)
    }

    /// Ticks until shutdown. Returns `Halted` once `max_failed_cycles`
    /// consecutive cycles could not write to the store.
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failed_cycles = 0u32;

        log::info!(
            "Polling scheduler started: {} registries every {:?}",
            self.targets.len(),
            self.interval
        );
        loop {
            tokio::select! {
                _ = shutdown.stopped() => break,
                _ = ticker.tick() => {}
            }

            let TickOutcome::Completed(report) = self.tick(&shutdown).await else {
                continue;
            };
            if report.is_storage_failed() {
                failed_cycles += 1;
                log::error!(
                    "Cycle ended with {} storage failure(s) and no updates ({}/{})",
                    report.storage_failures(),
                    failed_cycles,
                    self.max_failed_cycles
                );
                if failed_cycles >= self.max_failed_cycles {
                    return Err(CacheError::Halted(format!(
                        "{failed_cycles} consecutive reconciliation cycles failed to write to the cache"
                    )));
                }
            } else {
                failed_cycles = 0;
            }
        }

        log::info!("Polling scheduler stopped");
        Ok(())
    }
}
