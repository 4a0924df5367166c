//! Probe batch scheduling.
//!
//! A batch is partitioned by endpoint identity. Each identity group runs as
//! its own tokio task once it holds a permit from the scheduler's semaphore,
//! so the number of groups in flight never exceeds the configured cap, even
//! across overlapping batches. Members of one group are probed one after
//! another with a fixed pause to cap the request rate against one target.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use vigil_core::{Endpoint, EndpointId, EndpointKey, ProbeMethod, ProbeResult, ValidationError};

use crate::config::ProbeConfig;
use crate::prober::EndpointProber;

/// An endpoint left out of a batch because its identity failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEndpoint {
    pub id: EndpointId,
    pub error: ValidationError,
}

/// Counters and timings for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub endpoints: usize,
    pub groups: usize,
    pub rejected: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub by_tcp: usize,
    pub by_icmp: usize,
    /// Groups whose task died before producing a result. Their records are
    /// left as they were.
    pub failed_groups: usize,
    pub duration: Duration,
    /// Upper bound on `duration` derived from group count, cap, pace and timeout.
    pub worst_case: Duration,
}

/// Everything a batch produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    /// Monotonic per scheduler and above every sequence already recorded on
    /// the batch's endpoints. Reconciliation rejects writes from older batches.
    pub seq: u64,
    /// One result per probed endpoint, ordered by identity.
    pub results: Vec<ProbeResult>,
    pub rejected: Vec<RejectedEndpoint>,
    pub summary: BatchSummary,
}

/// Runs probe batches under a shared concurrency limit.
pub struct ProbeScheduler {
    prober: EndpointProber,
    concurrency: Arc<Semaphore>,
    max_concurrent_groups: usize,
    pace: Duration,
    probe_timeout: Duration,
    last_seq: AtomicU64,
}

impl ProbeScheduler {
    pub fn new(prober: EndpointProber, config: &ProbeConfig) -> Self {
        let max_concurrent_groups = config.max_concurrent_groups.max(1);
        Self {
            prober,
            concurrency: Arc::new(Semaphore::new(max_concurrent_groups)),
            max_concurrent_groups,
            pace: config.pace(),
            probe_timeout: config.probe_timeout(),
            last_seq: AtomicU64::new(0),
        }
    }

    pub fn max_concurrent_groups(&self) -> usize {
        self.max_concurrent_groups
    }

    /// Ensure the next batch sequence is greater than `seq`.
    ///
    /// Records persist the sequence of the batch that last wrote them, so a
    /// fresh process must continue above it or every write is stale.
    pub fn resume_after(&self, seq: u64) {
        let previous = self.last_seq.fetch_max(seq, Ordering::SeqCst);
        if previous < seq {
            tracing::debug!(from = previous, to = seq, "Batch sequence resumed");
        }
    }

    fn next_seq(&self, endpoints: &[Endpoint]) -> u64 {
        if let Some(recorded) = endpoints.iter().filter_map(|e| e.batch_seq).max() {
            self.resume_after(recorded);
        }
        self.last_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Probe every endpoint and wait for all groups to finish.
    ///
    /// Individual probe failures are encoded in the results; nothing here
    /// aborts the batch.
    pub async fn run_batch(&self, endpoints: &[Endpoint]) -> BatchOutcome {
        let seq = self.next_seq(endpoints);
        let batch_id = Uuid::new_v4();
        let start = Instant::now();

        let (groups, rejected) = partition(endpoints);
        for r in &rejected {
            tracing::warn!(
                batch_id = %batch_id,
                endpoint_id = %r.id,
                error = %r.error,
                "Endpoint rejected before probing"
            );
        }

        let largest_group = groups.values().copied().max().unwrap_or(0);
        let worst_case = worst_case_duration(
            groups.len(),
            self.max_concurrent_groups,
            largest_group,
            self.probe_timeout,
            self.pace,
        );

        tracing::info!(
            batch_id = %batch_id,
            seq,
            endpoints = endpoints.len(),
            groups = groups.len(),
            worst_case_ms = worst_case.as_millis(),
            "Probe batch started"
        );

        let mut tasks = JoinSet::new();
        for (key, members) in &groups {
            let (key, members) = (*key, *members);
            let prober = self.prober.clone();
            let semaphore = self.concurrency.clone();
            let pace = self.pace;
            let timeout = self.probe_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    tracing::error!(
                        batch_id = %batch_id,
                        endpoint = %key,
                        "Concurrency limiter closed"
                    );
                    return None;
                };
                let probing = tokio::spawn(async move {
                    probe_group(&prober, key, members, pace, timeout).await
                });
                match probing.await {
                    Ok(result) => Some((result, members)),
                    Err(e) => {
                        tracing::error!(
                            batch_id = %batch_id,
                            endpoint = %key,
                            members,
                            error = %e,
                            "Probe group failed, records keep their previous verdict"
                        );
                        None
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(endpoints.len());
        let mut failed_groups = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((result, members))) => {
                    results.extend(std::iter::repeat(result).take(members));
                }
                Ok(None) => failed_groups += 1,
                Err(e) => {
                    tracing::error!(batch_id = %batch_id, error = %e, "Probe group task panicked");
                    failed_groups += 1;
                }
            }
        }
        results.sort_by_key(|r| r.key);

        let summary = summarize(
            endpoints.len(),
            groups.len(),
            &rejected,
            &results,
            failed_groups,
            start.elapsed(),
            worst_case,
        );

        tracing::info!(
            batch_id = %batch_id,
            seq,
            reachable = summary.reachable,
            unreachable = summary.unreachable,
            by_tcp = summary.by_tcp,
            by_icmp = summary.by_icmp,
            rejected = summary.rejected,
            failed_groups = summary.failed_groups,
            duration_ms = summary.duration.as_millis(),
            worst_case_ms = summary.worst_case.as_millis(),
            "Probe batch complete"
        );

        BatchOutcome {
            batch_id,
            seq,
            results,
            rejected,
            summary,
        }
    }
}

/// Group endpoints by identity, counting members per group.
fn partition(
    endpoints: &[Endpoint],
) -> (BTreeMap<EndpointKey, usize>, Vec<RejectedEndpoint>) {
    let mut groups = BTreeMap::new();
    let mut rejected = Vec::new();

    for endpoint in endpoints {
        match endpoint.key() {
            Ok(key) => *groups.entry(key).or_insert(0) += 1,
            Err(error) => rejected.push(RejectedEndpoint {
                id: endpoint.id,
                error,
            }),
        }
    }

    (groups, rejected)
}

/// Probe one identity `members` times, pausing `pace` between probes.
///
/// The last probe's verdict stands for the whole group.
async fn probe_group(
    prober: &EndpointProber,
    key: EndpointKey,
    members: usize,
    pace: Duration,
    timeout: Duration,
) -> ProbeResult {
    let mut result = prober.probe_key(key, timeout).await;
    for _ in 1..members {
        tokio::time::sleep(pace).await;
        result = prober.probe_key(key, timeout).await;
    }
    result
}

/// Worst-case batch duration: `ceil(groups / cap)` waves of the slowest group,
/// where one probe can spend `timeout` on TCP and again on ICMP.
pub fn worst_case_duration(
    groups: usize,
    cap: usize,
    largest_group: usize,
    timeout: Duration,
    pace: Duration,
) -> Duration {
    if groups == 0 || largest_group == 0 {
        return Duration::ZERO;
    }

    let waves = saturating_u32(groups.div_ceil(cap.max(1)));
    let probes = saturating_u32(largest_group);
    let per_group = timeout
        .saturating_mul(2)
        .saturating_mul(probes)
        .saturating_add(pace.saturating_mul(probes - 1));

    per_group.saturating_mul(waves)
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn summarize(
    endpoints: usize,
    groups: usize,
    rejected: &[RejectedEndpoint],
    results: &[ProbeResult],
    failed_groups: usize,
    duration: Duration,
    worst_case: Duration,
) -> BatchSummary {
    let reachable = results.iter().filter(|r| r.reachable).count();
    let by_tcp = results
        .iter()
        .filter(|r| r.method == ProbeMethod::Tcp)
        .count();

    BatchSummary {
        endpoints,
        groups,
        rejected: rejected.len(),
        reachable,
        unreachable: results.len() - reachable,
        by_tcp,
        by_icmp: results.len() - by_tcp,
        failed_groups,
        duration,
        worst_case,
    }
}
