//! End-to-end probe → reconcile scenarios against scripted network primitives.
//!
//! Run with: cargo test --package vigil-probe --test integration

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use vigil_core::{Endpoint, EndpointKey, Liveness, ProbeMethod};
use vigil_probe::config::ProbeConfig;
use vigil_probe::driver::{refresh_all, run_cycle};
use vigil_probe::primitives::{IcmpProbe, TcpProbe};
use vigil_probe::prober::EndpointProber;
use vigil_probe::reconcile::StatusReconciler;
use vigil_probe::scheduler::ProbeScheduler;
use vigil_store::{EndpointStore, FileEndpointStore, MemoryEndpointStore};

/// TCP capability answering from a fixed table: `true` connects, `false` refuses.
#[derive(Default)]
struct TableTcp {
    open: HashMap<SocketAddrV4, bool>,
    calls: Mutex<Vec<(SocketAddrV4, Instant)>>,
}

#[async_trait]
impl TcpProbe for TableTcp {
    async fn connect(&self, addr: SocketAddrV4, _timeout: Duration) -> io::Result<bool> {
        self.calls.lock().unwrap().push((addr, Instant::now()));
        if self.open.get(&addr).copied().unwrap_or(false) {
            Ok(true)
        } else {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }
}

/// ICMP capability answering from a fixed table; unknown hosts never reply.
#[derive(Default)]
struct TableIcmp {
    replies: HashMap<Ipv4Addr, bool>,
    calls: AtomicUsize,
}

#[async_trait]
impl IcmpProbe for TableIcmp {
    async fn echo(&self, addr: Ipv4Addr, _timeout: Duration) -> io::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.replies.get(&addr).copied().unwrap_or(false))
    }
}

struct Harness {
    tcp: Arc<TableTcp>,
    icmp: Arc<TableIcmp>,
    scheduler: ProbeScheduler,
    reconciler: StatusReconciler,
}

fn harness(tcp: TableTcp, icmp: TableIcmp, store: Arc<dyn EndpointStore>) -> Harness {
    let tcp = Arc::new(tcp);
    let icmp = Arc::new(icmp);
    let config = ProbeConfig {
        probe_timeout_ms: 100,
        ..Default::default()
    };
    let prober = EndpointProber::new(tcp.clone(), icmp.clone());
    Harness {
        tcp,
        icmp,
        scheduler: ProbeScheduler::new(prober, &config),
        reconciler: StatusReconciler::new(store),
    }
}

#[tokio::test]
async fn tcp_connect_marks_reachable_by_tcp() {
    let addr = Ipv4Addr::new(10, 0, 0, 1);
    let store = Arc::new(MemoryEndpointStore::with_endpoints(vec![Endpoint::new(
        addr, 80,
    )]));
    let tcp = TableTcp {
        open: HashMap::from([(SocketAddrV4::new(addr, 80), true)]),
        ..Default::default()
    };
    let h = harness(tcp, TableIcmp::default(), store.clone());

    refresh_all(&*store, &h.scheduler, &h.reconciler)
        .await
        .unwrap();

    let record = store.find_by_address(addr).unwrap().unwrap();
    assert_eq!(record.liveness, Liveness::Reachable(ProbeMethod::Tcp));
    assert_eq!(h.icmp.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refused_and_silent_marks_unreachable_by_icmp() {
    let addr = Ipv4Addr::new(10, 0, 0, 2);
    let store = Arc::new(MemoryEndpointStore::with_endpoints(vec![Endpoint::new(
        addr, 22,
    )]));
    let h = harness(TableTcp::default(), TableIcmp::default(), store.clone());

    let report = refresh_all(&*store, &h.scheduler, &h.reconciler)
        .await
        .unwrap();

    assert_eq!(report.reconcile.updated, 1);
    let records = store.list_endpoints().unwrap();
    assert_eq!(records[0].liveness, Liveness::Unreachable(ProbeMethod::Icmp));
    assert_eq!(h.icmp.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shared_identity_probed_three_times_with_pacing() {
    let addr = Ipv4Addr::new(10, 0, 0, 3);
    let store = Arc::new(MemoryEndpointStore::with_endpoints(vec![
        Endpoint::new(addr, 80).with_name("ap-1"),
        Endpoint::new(addr, 80).with_name("ap-1-old"),
        Endpoint::new(addr, 80).with_name("ap-1-backup"),
    ]));
    let icmp = TableIcmp {
        replies: HashMap::from([(addr, true)]),
        ..Default::default()
    };
    let h = harness(TableTcp::default(), icmp, store.clone());

    let report = refresh_all(&*store, &h.scheduler, &h.reconciler)
        .await
        .unwrap();

    let calls = h.tcp.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(200));
    }

    assert_eq!(report.batch.results.len(), 3);
    assert_eq!(report.reconcile.updated, 3);
    let records = store.list_endpoints().unwrap();
    assert!(records
        .iter()
        .all(|r| r.liveness == Liveness::Reachable(ProbeMethod::Icmp)));
}

#[tokio::test]
async fn endpoint_deleted_mid_cycle_is_dropped() {
    let kept = Endpoint::new(Ipv4Addr::new(10, 0, 0, 4), 80);
    let gone = Endpoint::new(Ipv4Addr::new(10, 0, 0, 5), 80);
    let store = Arc::new(MemoryEndpointStore::with_endpoints(vec![
        kept.clone(),
        gone.clone(),
    ]));
    let h = harness(TableTcp::default(), TableIcmp::default(), store.clone());

    // The batch is built from a snapshot taken before the deletion.
    let snapshot = store.list_endpoints().unwrap();
    store.remove(gone.id).unwrap();

    let report = run_cycle(&h.scheduler, &h.reconciler, &snapshot)
        .await
        .unwrap();

    assert_eq!(report.reconcile.updated, 1);
    assert_eq!(report.reconcile.missing, 1);
    assert_eq!(store.len().unwrap(), 1);
    assert!(store.get(gone.id).unwrap().is_none());
}

#[tokio::test]
async fn file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("endpoints.json");
    let up = Ipv4Addr::new(10, 0, 0, 1);
    let down = Ipv4Addr::new(10, 0, 0, 2);
    let mut child = Endpoint::new(down, 22).with_name("antenna-7");
    let parent = Endpoint::new(up, 80).with_name("core");
    child.parent = Some(parent.id);

    let store = Arc::new(FileEndpointStore::create(&path, &[parent, child]).unwrap());
    let tcp = TableTcp {
        open: HashMap::from([(SocketAddrV4::new(up, 80), true)]),
        ..Default::default()
    };
    let h = harness(tcp, TableIcmp::default(), store.clone());

    refresh_all(&*store, &h.scheduler, &h.reconciler)
        .await
        .unwrap();

    let reopened = FileEndpointStore::new(&path);
    let records = reopened.list_endpoints().unwrap();
    assert_eq!(records[0].liveness, Liveness::Reachable(ProbeMethod::Tcp));
    assert_eq!(records[1].liveness, Liveness::Unreachable(ProbeMethod::Icmp));
    assert_eq!(records[1].parent, Some(records[0].id));
}

#[tokio::test]
async fn restarted_engine_keeps_updating_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("endpoints.json");
    let addr = Ipv4Addr::new(10, 0, 0, 1);
    let store = Arc::new(FileEndpointStore::create(&path, &[Endpoint::new(addr, 80)]).unwrap());

    // First process: three cycles while the host answers.
    let tcp = TableTcp {
        open: HashMap::from([(SocketAddrV4::new(addr, 80), true)]),
        ..Default::default()
    };
    let before = harness(tcp, TableIcmp::default(), store.clone());
    for _ in 0..3 {
        refresh_all(&*store, &before.scheduler, &before.reconciler)
            .await
            .unwrap();
    }
    assert_eq!(store.list_endpoints().unwrap()[0].batch_seq, Some(3));

    // Second process over the same file, with the host gone.
    let reopened = Arc::new(FileEndpointStore::new(&path));
    let after = harness(TableTcp::default(), TableIcmp::default(), reopened.clone());
    let report = refresh_all(&*reopened, &after.scheduler, &after.reconciler)
        .await
        .unwrap();

    assert_eq!(report.batch.seq, 4);
    assert_eq!(report.reconcile.updated, 1);
    assert_eq!(report.reconcile.stale, 0);
    let record = reopened.find_by_address(addr).unwrap().unwrap();
    assert_eq!(record.liveness, Liveness::Unreachable(ProbeMethod::Icmp));
    assert_eq!(record.batch_seq, Some(4));
}

#[tokio::test]
async fn one_shot_target_updates_record_written_by_earlier_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("endpoints.json");
    let addr = Ipv4Addr::new(10, 0, 0, 2);
    let mut seen = Endpoint::new(addr, 22);
    seen.liveness = Liveness::Reachable(ProbeMethod::Tcp);
    seen.batch_seq = Some(250);
    let store = Arc::new(FileEndpointStore::create(&path, &[seen]).unwrap());

    let h = harness(TableTcp::default(), TableIcmp::default(), store.clone());
    let target = store
        .find_endpoint(&EndpointKey::new(addr, 22))
        .unwrap()
        .unwrap();
    let report = run_cycle(&h.scheduler, &h.reconciler, &[target])
        .await
        .unwrap();

    assert_eq!(report.reconcile.updated, 1);
    let records = store.list_endpoints().unwrap();
    assert_eq!(records[0].liveness, Liveness::Unreachable(ProbeMethod::Icmp));
    assert_eq!(records[0].batch_seq, Some(251));
}

#[tokio::test]
async fn endpoint_registered_between_cycles_is_refreshed() {
    let store = Arc::new(MemoryEndpointStore::new());
    let addr = Ipv4Addr::new(10, 0, 0, 6);
    let tcp = TableTcp {
        open: HashMap::from([(SocketAddrV4::new(addr, 443), true)]),
        ..Default::default()
    };
    let h = harness(tcp, TableIcmp::default(), store.clone());

    let empty = refresh_all(&*store, &h.scheduler, &h.reconciler)
        .await
        .unwrap();
    assert!(empty.batch.results.is_empty());

    store.insert(Endpoint::new(addr, 443)).unwrap();
    let report = refresh_all(&*store, &h.scheduler, &h.reconciler)
        .await
        .unwrap();

    assert_eq!(report.reconcile.updated, 1);
    let records = store.list_endpoints().unwrap();
    assert_eq!(records[0].liveness, Liveness::Reachable(ProbeMethod::Tcp));
}
