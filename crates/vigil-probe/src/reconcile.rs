//! Status reconciliation: write probe verdicts back onto endpoint records.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use vigil_core::{EndpointKey, Liveness, ProbeResult, ProbeStamp};
use vigil_store::{EndpointStore, UpdateOutcome};

use crate::error::Result;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Records rewritten.
    pub updated: usize,
    /// Identities with no record (deleted mid-cycle).
    pub missing: usize,
    /// Identities whose records already carry a newer batch's verdict.
    pub stale: usize,
}

pub struct StatusReconciler {
    store: Arc<dyn EndpointStore>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn EndpointStore>) -> Self {
        Self { store }
    }

    /// Apply the results of batch `batch_seq`.
    ///
    /// Each identity is written once; when a batch holds several results for
    /// one identity, the last one wins. The whole pass is one store write.
    /// Store failures abort the pass.
    pub fn apply(&self, batch_seq: u64, results: &[ProbeResult]) -> Result<ReconcileSummary> {
        let stamp = ProbeStamp {
            batch_seq,
            probed_at: Utc::now(),
        };

        let latest: BTreeMap<EndpointKey, Liveness> =
            results.iter().map(|r| (r.key, r.liveness())).collect();
        let updates: Vec<(EndpointKey, Liveness)> = latest.into_iter().collect();
        if updates.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let outcomes = self.store.update_many(&updates, stamp)?;

        let mut summary = ReconcileSummary::default();
        for ((key, _), outcome) in updates.iter().zip(outcomes) {
            match outcome {
                UpdateOutcome::Updated(n) => summary.updated += n,
                UpdateOutcome::Missing => {
                    tracing::info!(endpoint = %key, "No endpoint record for probe result, dropping");
                    summary.missing += 1;
                }
                UpdateOutcome::Stale => {
                    tracing::debug!(
                        endpoint = %key,
                        batch_seq,
                        "Record holds a newer verdict, skipping"
                    );
                    summary.stale += 1;
                }
            }
        }

        Ok(summary)
    }
}
