//! Process entry point: parses CLI configuration, wires up the shared
//! configuration cache, spawns the poller workers and the DB-config
//! worker, and shuts every task down cleanly on SIGINT/SIGTERM.
//!
//! Modeled on `proxy/src/bin/local_proxy.rs`'s `main`: `clap` parsing,
//! `tracing-subscriber` init, a broadcast shutdown signal fanned out to
//! every spawned task, and `tokio::task::JoinSet` used to await them all
//! before exiting.

mod ahp;
mod config;
mod db;
mod dcw;
mod ipc;
mod macro_expand;
mod preprocessor;
mod process_title;
mod self_monitor;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ahp::{PollerConfig, Worker};
use cache::Cache;
use config::ServerArgs;
use db::MockDbConfigStore;
use dcw::DbConfigWorker;
use macro_expand::TableMacroExpander;
use preprocessor::LoggingSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_logging(&args.log_level)?;

    let cache = Arc::new(Cache::new());
    let http = build_http_client(&args)?;
    let preprocessor: Arc<dyn preprocessor::PreprocessorSink> = Arc::new(LoggingSink);

    let (shutdown_tx, _) = ipc::shutdown_channel();
    // `_dcw_sender` would be handed to whatever detects a host/proxy rename
    // and needs to trigger an out-of-cycle macro resync; nothing in this
    // binary does yet. Bound here (not dropped) so the endpoint stays open:
    // dropping the sender would close the channel and make DCW's `recv()`
    // resolve to `None` immediately, which reads as a shutdown request.
    let (_dcw_sender, dcw_endpoint) = ipc::dbconfig_worker_endpoint();

    let mut tasks = JoinSet::new();

    let poller_config = PollerConfig {
        poller_type: cache::items::PollerType::HttpAgent,
        batch_ceiling: args.poller_batch_ceiling,
        fetch_interval: args.poller_fetch_interval,
        next_check_interval: args.poller_next_check_interval,
        source_ip: args.source_ip.clone(),
        default_timeout: args.default_timeout,
    };

    for worker_num in 1..=args.http_pollers {
        let worker = Worker::new(
            worker_num,
            cache.clone(),
            http.clone(),
            preprocessor.clone(),
            shutdown_tx.subscribe(),
            poller_config.clone(),
        );
        tasks.spawn(worker.run());
    }

    let db_store = Arc::new(MockDbConfigStore::default());
    let macro_expander = Arc::new(TableMacroExpander::new());
    let dcw = DbConfigWorker::new(db_store, macro_expander, dcw_endpoint, shutdown_tx.subscribe());
    tasks.spawn(dcw.run());

    info!(
        pollers = args.http_pollers,
        "monitoring server started, awaiting shutdown signal"
    );
    wait_for_shutdown_signal().await?;
    info!("shutdown signal received, stopping workers");
    shutdown_tx.signal();

    while tasks.join_next().await.is_some() {}
    info!("monitoring server stopped");
    Ok(())
}

fn init_logging(filter: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_new(filter).context("invalid log level filter")?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

fn build_http_client(args: &ServerArgs) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(args.default_timeout);
    if let Some(ip) = &args.source_ip {
        let addr: std::net::IpAddr = ip.parse().context("invalid --source-ip")?;
        builder = builder.local_address(addr);
    }
    builder.build().context("failed to build HTTP client")
}

/// Waits for SIGINT or (on unix) SIGTERM. Failing to install either handler
/// is a startup-time `Fatal` condition, not something to recover from, so it
/// propagates as an error rather than panicking.
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to install SIGINT handler")
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
