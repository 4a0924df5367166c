//! CLI entry point for the vigil-probe liveness engine.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use vigil_core::config::load_section;
use vigil_core::{Endpoint, EndpointKey};
use vigil_store::{EndpointStore, FileEndpointStore};

use vigil_probe::config::ProbeConfig;
use vigil_probe::driver::{refresh_all, run_cycle, PeriodicDriver};
use vigil_probe::primitives::{SystemPing, TokioTcpProbe};
use vigil_probe::prober::EndpointProber;
use vigil_probe::reconcile::StatusReconciler;
use vigil_probe::scheduler::ProbeScheduler;

#[derive(Parser)]
#[command(name = "vigil-probe")]
#[command(about = "Liveness probing engine for registered network endpoints")]
struct Cli {
    /// Probe only these endpoints (`a.b.c.d:port`, or `a.b.c.d` for port 80).
    #[arg(short, long)]
    target: Vec<String>,

    /// Run a single probe batch, print the results and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with periodic refreshes.
    #[arg(long)]
    daemon: bool,

    /// Config file prefix (default: vigil).
    #[arg(short, long, default_value = "vigil")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config: ProbeConfig = load_section(&cli.config, "probe")?;
    config.validate()?;

    let store: Arc<dyn EndpointStore> = Arc::new(FileEndpointStore::new(&config.store_path));
    tracing::info!(store_path = %config.store_path, "Using endpoint file store");

    let ping = SystemPing::new(&config.ping_path);
    if let Err(e) = ping.verify_installation().await {
        tracing::warn!(
            ping_path = %config.ping_path,
            error = %e,
            "Ping check failed, ICMP fallback will report endpoints unreachable"
        );
    }

    let prober = EndpointProber::new(Arc::new(TokioTcpProbe), Arc::new(ping));
    let scheduler = Arc::new(ProbeScheduler::new(prober, &config));

    if cli.once {
        let reconciler = StatusReconciler::new(store.clone());
        let report = if cli.target.is_empty() {
            refresh_all(store.as_ref(), &scheduler, &reconciler).await?
        } else {
            let endpoints = resolve_targets(store.as_ref(), &cli.target)?;
            run_cycle(&scheduler, &reconciler, &endpoints).await?
        };

        for rejected in &report.batch.rejected {
            eprintln!("rejected endpoint {}: {}", rejected.id, rejected.error);
        }
        println!("{}", serde_json::to_string_pretty(&report.batch.results)?);
    } else if cli.daemon {
        let driver = PeriodicDriver::new(&config, store, scheduler);
        tokio::select! {
            _ = driver.run() => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown requested");
            }
        }
    } else {
        anyhow::bail!("Specify --once (one-shot probe) or --daemon (periodic refresh)");
    }

    Ok(())
}

/// Map CLI targets to endpoint records.
///
/// Registered identities use their stored record; anything else is probed
/// ad hoc and its result is dropped at reconciliation.
fn resolve_targets(
    store: &dyn EndpointStore,
    targets: &[String],
) -> anyhow::Result<Vec<Endpoint>> {
    let mut endpoints = Vec::with_capacity(targets.len());
    for raw in targets {
        let key: EndpointKey = raw.parse()?;
        match store.find_endpoint(&key)? {
            Some(endpoint) => endpoints.push(endpoint),
            None => {
                tracing::info!(endpoint = %key, "Target is not registered, probing ad hoc");
                endpoints.push(Endpoint::new(key.address, i64::from(key.port)));
            }
        }
    }
    Ok(endpoints)
}
