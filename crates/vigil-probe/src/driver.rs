//! Refresh cycles and the periodic driver.
//!
//! A refresh cycle reads endpoints, runs one probe batch and reconciles the
//! results. The driver fires a cycle on every tick of a single timer for the
//! lifetime of the process. What a tick does while the previous cycle is
//! still running is governed by [`OverlapPolicy`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;

use vigil_core::Endpoint;
use vigil_store::EndpointStore;

use crate::config::{OverlapPolicy, ProbeConfig};
use crate::error::Result;
use crate::reconcile::{ReconcileSummary, StatusReconciler};
use crate::scheduler::{BatchOutcome, ProbeScheduler};

/// Result of one probe-and-reconcile cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub batch: BatchOutcome,
    pub reconcile: ReconcileSummary,
}

/// Probe `endpoints` and write the verdicts back.
pub async fn run_cycle(
    scheduler: &ProbeScheduler,
    reconciler: &StatusReconciler,
    endpoints: &[Endpoint],
) -> Result<CycleReport> {
    let batch = scheduler.run_batch(endpoints).await;
    let reconcile = reconciler.apply(batch.seq, &batch.results)?;

    tracing::info!(
        batch_id = %batch.batch_id,
        seq = batch.seq,
        updated = reconcile.updated,
        missing = reconcile.missing,
        stale = reconcile.stale,
        "Reconciliation complete"
    );

    Ok(CycleReport { batch, reconcile })
}

/// Probe every endpoint currently in the store.
///
/// A store read failure abandons the cycle before any probing.
pub async fn refresh_all(
    store: &dyn EndpointStore,
    scheduler: &ProbeScheduler,
    reconciler: &StatusReconciler,
) -> Result<CycleReport> {
    let endpoints = store.list_endpoints()?;
    run_cycle(scheduler, reconciler, &endpoints).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
}

/// Fires a full refresh on a fixed interval.
pub struct PeriodicDriver {
    store: Arc<dyn EndpointStore>,
    scheduler: Arc<ProbeScheduler>,
    reconciler: Arc<StatusReconciler>,
    interval: Duration,
    overlap: OverlapPolicy,
    in_flight: Arc<AtomicUsize>,
}

impl PeriodicDriver {
    pub fn new(
        config: &ProbeConfig,
        store: Arc<dyn EndpointStore>,
        scheduler: Arc<ProbeScheduler>,
    ) -> Self {
        let reconciler = Arc::new(StatusReconciler::new(store.clone()));
        Self {
            store,
            scheduler,
            reconciler,
            interval: config.interval(),
            overlap: config.overlap,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> DriverState {
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            DriverState::Idle
        } else {
            DriverState::Running
        }
    }

    /// Handle one timer tick.
    ///
    /// Returns the spawned cycle, or `None` when the tick was skipped because
    /// a cycle is still running under [`OverlapPolicy::Skip`].
    pub fn trigger(&self) -> Option<JoinHandle<()>> {
        match self.overlap {
            OverlapPolicy::Skip => {
                if self
                    .in_flight
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    tracing::warn!("Previous refresh still running, skipping tick");
                    return None;
                }
            }
            OverlapPolicy::Concurrent => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
            }
        }

        let guard = InFlight(self.in_flight.clone());
        let store = self.store.clone();
        let scheduler = self.scheduler.clone();
        let reconciler = self.reconciler.clone();

        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = refresh_all(store.as_ref(), &scheduler, &reconciler).await {
                tracing::error!(error = %e, "Scheduled refresh failed");
            }
        }))
    }

    /// Tick forever. The first tick fires immediately.
    pub async fn run(&self) {
        let mut ticker = interval(self.interval);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            overlap = ?self.overlap,
            max_concurrent_groups = self.scheduler.max_concurrent_groups(),
            "Periodic driver started"
        );

        loop {
            ticker.tick().await;
            tracing::debug!("Scheduled refresh triggered");
            self.trigger();
        }
    }
}

/// Marks a cycle as finished when dropped, including on panic.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
