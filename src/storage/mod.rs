//! Metrics sinks -- where probe results are forwarded after each check.
//!
//! Writes are best effort: the scheduler logs a [`StorageError`] and moves on.

pub mod noop;
pub mod pushgateway;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::MetricsConfig;
use crate::probes::{LatencyResult, ThroughputResult};

pub use self::noop::NoopSink;
pub use self::pushgateway::PushGatewaySink;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to push metrics: {0}")]
    Push(String),

    #[error("metrics backend rejected push with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("metrics push cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Push(e.to_string())
    }
}

/// Destination for probe results.
///
/// Implementations should give up on in-flight backend calls once `cancel`
/// fires and return [`StorageError::Cancelled`].
#[async_trait::async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_latency(
        &self,
        cancel: &CancellationToken,
        result: &LatencyResult,
    ) -> Result<(), StorageError>;

    async fn record_throughput(
        &self,
        cancel: &CancellationToken,
        result: &ThroughputResult,
    ) -> Result<(), StorageError>;

    /// Flush and release the backend. Failures are logged, not returned.
    async fn close(&self, cancel: &CancellationToken);

    /// Current metrics in Prometheus text format, if the sink keeps any.
    fn render_metrics(&self) -> Option<String> {
        None
    }
}

/// Build the sink selected by `[metrics].engine`.
///
/// The config is expected to be validated; an unknown engine falls back to
/// the no-op sink.
pub fn from_config(config: &MetricsConfig) -> Result<Arc<dyn MetricsSink>, StorageError> {
    match config.engine.as_str() {
        "prometheus" => {
            let sink = PushGatewaySink::new(
                &config.prometheus.push_gateway_url,
                &config.prometheus.job,
            )?;
            info!(url = %config.prometheus.push_gateway_url, job = %config.prometheus.job, "using prometheus push gateway sink");
            Ok(Arc::new(sink))
        }
        _ => {
            info!("using no-op metrics sink");
            Ok(Arc::new(NoopSink))
        }
    }
}
