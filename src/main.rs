//! Deposit Relayer Node
//!
//! Watches a source chain's deposit feed and turns every deposit into a
//! bridge transfer message for the destination chain.
//!
//! # Flow
//!
//! 1. Configuration is loaded and the chain section validated (fail fast)
//! 2. A writer queue is registered on the router per configured destination
//! 3. The listener polls the feed, translates deposits and routes messages
//! 4. SIGINT/SIGTERM stop the listener; an exhausted retry budget is reported
//!    back here as a fatal error and the process exits non-zero

use std::sync::Arc;
use std::time::Duration;

use deposit_relayer::bounded_cache::SeenDeposits;
use deposit_relayer::router::spawn_logging_writer;
use deposit_relayer::{server, ChainId, ChainRouter, Config, HttpDepositFeed, Listener, PollMode};
use eyre::WrapErr;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting Deposit Relayer");

    let config = Config::load().wrap_err("Failed to load configuration")?;
    let chain = Arc::new(
        config
            .chain_config()
            .wrap_err("Invalid chain configuration")?,
    );
    info!(
        chain_id = %chain.id(),
        chain = %chain.name(),
        endpoint = %chain.endpoint(),
        test_mode = %chain.test_mode(),
        fresh_start = chain.fresh_start(),
        "Configuration loaded"
    );

    // Destination writers
    let mut router = ChainRouter::new();
    let mut writers = Vec::new();
    for dest in &config.router.destinations {
        let (tx, handle) = spawn_logging_writer(ChainId(*dest), config.router.queue_capacity);
        router.register(ChainId(*dest), tx);
        writers.push(handle);
    }
    if writers.is_empty() {
        warn!("No destination writers registered; every translated message will be rejected");
    }

    let source = HttpDepositFeed::new(config.feed.url.clone(), config.feed_timeout())
        .wrap_err("Failed to create deposit feed client")?;
    info!(feed_url = %source.url(), timeout = ?config.feed_timeout(), "Deposit feed ready");

    let stop = CancellationToken::new();
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let mut listener = Listener::new(
        chain.clone(),
        Arc::new(source),
        Arc::new(router),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(config.poll_policy());
    if config.poll.mode == PollMode::Continuous {
        listener = listener.with_dedupe(SeenDeposits::new(
            config.poll.dedupe_capacity,
            Duration::from_secs(config.poll.dedupe_ttl_secs),
        ));
    }
    let stats = listener.stats();

    // Health/metrics server
    let server_stop = stop.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = server::start_server(health_port, stats, server_stop).await {
            error!(error = %e, "Health server error");
        }
    });

    // Signal handling
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_stop.cancel();
    });

    let handle = listener.start();

    let result = tokio::select! {
        fatal = sys_err_rx => match fatal {
            Ok(err) => {
                error!(error = %err, "Listener reported a fatal error, shutting down");
                stop.cancel();
                Err(eyre::Report::new(err))
            }
            // Sender dropped: the listener ended without a fatal report
            Err(_) => Ok(()),
        },
        _ = stop.cancelled() => Ok(()),
    };

    let outcome = handle.await.wrap_err("Listener task panicked")?;
    info!(?outcome, "Listener stopped");

    for writer in writers {
        match writer.await {
            Ok(delivered) => info!(delivered, "Writer drained"),
            Err(e) => warn!(error = %e, "Writer task failed"),
        }
    }

    result?;
    info!("Deposit Relayer stopped");
    Ok(())
}

/// Initialize tracing/logging; `LOG_FORMAT=json` switches to JSON output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,deposit_relayer=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let (plain, structured) = if json {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
