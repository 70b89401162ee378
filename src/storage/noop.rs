use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{MetricsSink, StorageError};
use crate::probes::{LatencyResult, ThroughputResult};

/// Sink that only logs results. Used when no metrics backend is configured.
pub struct NoopSink;

#[async_trait::async_trait]
impl MetricsSink for NoopSink {
    async fn record_latency(
        &self,
        _cancel: &CancellationToken,
        result: &LatencyResult,
    ) -> Result<(), StorageError> {
        info!(
            server = %result.target,
            latency_ms = result.latency.as_millis() as u64,
            "latency result"
        );
        Ok(())
    }

    async fn record_throughput(
        &self,
        _cancel: &CancellationToken,
        result: &ThroughputResult,
    ) -> Result<(), StorageError> {
        info!(
            server = %result.target,
            download_mbps = result.download_mbps,
            upload_mbps = result.upload_mbps,
            latency_ms = result.latency.as_millis() as u64,
            "throughput result"
        );
        Ok(())
    }

    async fn close(&self, _cancel: &CancellationToken) {}
}
