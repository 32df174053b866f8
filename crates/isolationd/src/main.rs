//! PDR isolation daemon entry point.
//!
//! Loads configuration and reference data, connects to UFM, then runs the
//! isolation loop (and optionally the admin API) until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pdr_isolationd::admin::{self, AdminState};
use pdr_isolationd::config::{IsolationConfig, DEFAULT_CONFIG_PATH};
use pdr_isolationd::controller::IsolationMgr;
use pdr_isolationd::reference::ReferenceData;
use pdr_ufm_client::{UfmClient, UfmClientConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Admin requests queued for the control loop
const ADMIN_QUEUE_DEPTH: usize = 16;

/// Packet-drop-rate port isolation daemon
#[derive(Parser, Debug)]
#[command(name = "isolationd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Decide and track only; never isolate or deisolate in UFM
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("isolationd: Starting PDR isolation daemon");

    let mut config = IsolationConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if args.dry_run {
        config.common.dry_run = true;
    }
    config.validate()?;

    if config.common.dry_run {
        warn!("isolationd: Dry-run mode, no port will be isolated or deisolated in UFM");
    }

    let reference = ReferenceData::load(
        &config.reference.ber_matrix_path,
        &config.reference.fec_lookup_path,
    )?;

    let client = UfmClient::new(UfmClientConfig {
        base_url: config.ufm.base_url.clone(),
        telemetry_url: config.ufm.telemetry_url.clone(),
        username: config.ufm.username.clone(),
        password: config.ufm.password.clone(),
        request_timeout: config.request_timeout(),
    })?;
    info!(ufm = %client.base_url(), "isolationd: UFM client ready");

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let mut manager = IsolationMgr::new(Arc::new(client), &config, reference);

    let admin_task = if config.admin.enabled {
        let addr = config.admin_addr()?;
        let (tx, rx) = mpsc::channel(ADMIN_QUEUE_DEPTH);
        let state = AdminState::new(tx, manager.subscribe());
        manager = manager.with_admin(rx);

        let admin_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::serve(addr, state, admin_cancel).await {
                error!(error = %e, "isolationd: Admin API failed");
            }
        }))
    } else {
        None
    };

    manager.run(cancel.clone()).await;

    cancel.cancel();
    if let Some(task) = admin_task {
        if let Err(e) = task.await {
            warn!(error = %e, "isolationd: Admin task did not shut down cleanly");
        }
    }

    info!("isolationd: Graceful shutdown complete");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("isolationd: Received shutdown signal");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "isolationd: SIGTERM handler unavailable, waiting for SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
