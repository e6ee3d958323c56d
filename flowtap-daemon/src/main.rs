#![forbid(unsafe_code)]

//! Wires a capture source to a pool of worker tasks, each of which calls
//! `Classifier -> SessionManager::feed` for every packet it dequeues
//! (`§5` "Scheduling model").

mod capture;
mod cli;

use std::sync::Arc;

use clap::Parser;
use flowtap_core::Config;
use flowtap_session::SessionManager;
use flowtap_sinks::{KeyFrequencySink, LoggingSink, SizeHistogramSink};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use cli::Cli;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(host) = cli.local_host {
        config.local_host = host;
    }
    if let Some(port) = cli.local_port {
        config.local_port = port;
    }
    if cli.only_in {
        config.only_in = true;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!(
        local = %format!("{}:{}", config.local_host, config.local_port),
        workers = config.workers,
        "starting flowtap"
    );

    let sinks: Vec<Arc<dyn flowtap_session::Sink>> = vec![
        Arc::new(LoggingSink),
        Arc::new(KeyFrequencySink::new()),
        Arc::new(SizeHistogramSink::new()),
    ];
    let manager = Arc::new(SessionManager::new(&config, sinks));
    manager.spawn_background_tasks(&config);
    spawn_telemetry_mirror(Arc::clone(&manager), config.stats_log_interval);

    let (tx, rx) = mpsc::channel(4096);
    let rx = Arc::new(Mutex::new(rx));

    match (&cli.replay, &cli.interface) {
        (Some(path), _) => capture::spawn_replay(path, tx)?,
        (None, Some(interface)) => {
            capture::spawn_live_capture(interface.clone(), config.local_host, config.local_port, tx)?
        }
        (None, None) => {
            error!("either --interface or --replay must be given");
            anyhow::bail!("no capture source configured");
        }
    }

    let mut workers = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let manager = Arc::clone(&manager);
        let rx = Arc::clone(&rx);
        workers.push(tokio::spawn(async move {
            loop {
                let packet = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                match packet {
                    Some(pkt) => manager.feed(pkt).await,
                    None => {
                        info!(worker = id, "capture channel closed, worker exiting");
                        break;
                    }
                }
            }
        }));
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        _ = shutdown => {
            info!("shutdown signal received");
        }
        _ = futures_all(workers) => {
            info!("all workers exited");
        }
    }

    Ok(())
}

async fn futures_all(workers: Vec<tokio::task::JoinHandle<()>>) {
    for w in workers {
        let _ = w.await;
    }
}

/// Mirror the session manager's counters into the process-wide telemetry
/// registry, so anything reading that registry (a future HTTP exporter, an
/// operator's own sink) sees the same numbers the stats log line does.
fn spawn_telemetry_mirror(manager: Arc<SessionManager>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            let stats = manager.stats();
            flowtap_telemetry::set_gauge("sessions_live", manager.live_sessions() as u64);
            flowtap_telemetry::set_gauge(
                "packets_processed",
                stats.packets_processed.load(std::sync::atomic::Ordering::Relaxed),
            );
            flowtap_telemetry::set_gauge(
                "packets_missed",
                stats.packets_missed.load(std::sync::atomic::Ordering::Relaxed),
            );
            flowtap_telemetry::log_snapshot();
        }
    });
}
