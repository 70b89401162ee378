//! linkwatch -- home-network health monitor.
//!
//! A cheap latency probe runs often; an expensive throughput test runs on a
//! slow schedule, or early when latency crosses a threshold. Both cadences
//! are rate limited and can be paused at runtime. Results go to a metrics
//! sink and a bounded in-memory history for the debug dashboard.

pub mod api;
pub mod config;
pub mod introspect;
pub mod logging;
pub mod probes;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::introspect::IntrospectionView;
use crate::probes::{ProbeRunner, SpeedTestClient};
use crate::scheduler::{Scheduler, SchedulerOptions};
use crate::storage::MetricsSink;

/// Run the monitor until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });
    run_until(config, cancel).await
}

/// Run the monitor until `cancel` fires.
///
/// Shutdown order: both scheduler activities stop, then the debug server,
/// then the metrics sink is closed.
pub async fn run_until(config: Config, cancel: CancellationToken) -> Result<()> {
    let sink = storage::from_config(&config.metrics)?;
    let client = SpeedTestClient::new(config.probe.clone())?;
    let runner = Arc::new(ProbeRunner::new(
        Arc::new(client),
        config.monitor.history_capacity,
    ));
    let scheduler = Arc::new(Scheduler::new(
        runner,
        Arc::clone(&sink),
        SchedulerOptions::from(&config.monitor),
    ));

    let server = if config.debug_server.enabled {
        let state = api::state::AppState {
            view: IntrospectionView::new(Arc::clone(&scheduler)),
            config: Arc::new(config.clone()),
            sink: Arc::clone(&sink),
        };
        let bind = config.debug_server.listen_address.clone();
        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, state, server_cancel).await {
                error!(error = %format!("{e:#}"), "debug server failed");
            }
        }))
    } else {
        None
    };

    scheduler.start(cancel.clone()).await;

    if let Some(handle) = server {
        // Activities that panic return without the token firing.
        cancel.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "debug server task panicked");
        }
    }

    close_sink(sink.as_ref(), SINK_CLOSE_TIMEOUT).await;
    info!("linkwatch stopped");
    Ok(())
}

/// Upper bound on the final metrics flush at shutdown.
pub const SINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close `sink`, cancelling its final flush after `deadline`.
///
/// The run token has already fired by the time the sink is closed, so the
/// flush gets a token of its own.
pub async fn close_sink(sink: &dyn MetricsSink, deadline: Duration) {
    let cancel = CancellationToken::new();
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        })
    };
    sink.close(&cancel).await;
    timer.abort();
}

/// Wait for SIGINT or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
