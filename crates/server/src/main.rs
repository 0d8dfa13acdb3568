mod auth;
mod cli;
mod error;
mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use dataforge_engine::{Engine, EngineConfig, StopStore};

use crate::cli::Cli;
use crate::state::AppState;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let min_threads = cli.min_threads.max(1);
    let max_threads = cli.max_threads.max(min_threads);

    // Generation runs on the runtime's blocking threads; size them to the
    // worker-pool bounds and reclaim idle ones on the pool's timeout.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(max_threads)
        .thread_keep_alive(EngineConfig::WORKER_IDLE_TIMEOUT)
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(cli, min_threads, max_threads))
}

async fn run(cli: Cli, min_threads: usize, max_threads: usize) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(&cli.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let stop_store = match &cli.abort_store_url {
        Some(url) => match StopStore::connect(url, cli.abort_store_prefix.clone()).await {
            Ok(store) => {
                info!("abort store connected");
                Some(store)
            }
            Err(err) => {
                warn!(%err, "abort store unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let engine = Arc::new(Engine::new(
        EngineConfig {
            min_threads,
            max_threads,
            stop_key_ttl: EngineConfig::DEFAULT_STOP_KEY_TTL,
        },
        stop_store,
    ));

    if cli.api_key.is_none() {
        warn!("no API key configured; protected endpoints are open");
    }

    let state = AppState::new(engine.clone(), cli.api_key.clone(), cli.whitelist.clone());
    let app = routes::router(state, cli.body_limit_bytes as usize);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_terminate(cancel.clone()));

    let listener = TcpListener::bind((cli.host, cli.port))
        .await
        .with_context(|| format!("bind {}:{}", cli.host, cli.port))?;
    info!(
        host = %cli.host,
        port = cli.port,
        min_threads,
        max_threads,
        "dataforge listening"
    );

    // On the shutdown signal, cancel every job before the server starts
    // draining connections, so in-flight handlers and streams unwind fast.
    let shutdown = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            let cancelled = engine.shutdown();
            if cancelled > 0 {
                info!(cancelled, "shutdown: cancelled active jobs");
            }
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("serve")?;

    // Handlers are gone; give still-unwinding pool tasks a bounded window.
    engine.shutdown();
    if !engine
        .drain(Duration::from_secs(cli.drain_timeout_secs))
        .await
    {
        warn!("drain timeout expired with generation tasks still running");
    }
    info!("dataforge stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then trip the shutdown token.
async fn cancel_on_terminate(cancel: CancellationToken) {
    use tokio::signal::ctrl_c;
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        error!("failed to install the SIGTERM listener; shutting down");
        cancel.cancel();
        return;
    };

    select! {
        _ = ctrl_c() => info!("received SIGINT, starting shutdown"),
        _ = terminate.recv() => info!("received SIGTERM, starting shutdown"),
    }
    cancel.cancel();
}
