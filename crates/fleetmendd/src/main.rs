//! fleetmendd: the fleetmend daemon.
//!
//! Opens the state store, serves the REST API and runs the dispatcher that
//! turns triggers into reconciles.

mod config;
mod dispatcher;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleetmend_api::{ApiState, build_router};
use fleetmend_controller::Reconciler;
use fleetmend_metrics::RemediationMetrics;
use fleetmend_state::StateStore;

use crate::config::DaemonConfig;
use crate::dispatcher::Dispatcher;

#[derive(Parser)]
#[command(name = "fleetmendd", about = "fleetmend health-check remediation daemon")]
struct Cli {
    /// Path to fleetmend.toml. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the state database.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// API listen address.
    #[arg(long)]
    listen: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::from_file(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }

    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetmend=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        namespace = %config.namespace,
        "starting fleetmendd"
    );

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let store = StateStore::open(&config.db_path())?;
    info!(path = %config.db_path().display(), "state store opened");

    let metrics = Arc::new(RemediationMetrics::new());
    let reconciler = Arc::new(
        Reconciler::new(Arc::new(store.clone()), config.reconciler_config())
            .with_metrics(metrics.clone()),
    );

    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Dispatcher::new(reconciler.clone(), config.dispatcher.clone());
    let dispatcher_handle = tokio::spawn(dispatcher.run(trigger_rx, shutdown_rx));

    let router = build_router(ApiState {
        store,
        triggers: trigger_tx,
        reconciler,
    });

    let addr: SocketAddr = config
        .api
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.api.listen))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "dispatcher task failed");
    }

    info!("fleetmendd stopped");
    Ok(())
}
