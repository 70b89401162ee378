//! Executes single probes and records successful outcomes.

use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::history::ResultHistory;
use super::{LatencyResult, ProbeError, SpeedProbe, ThroughputResult};

struct Histories {
    latency: ResultHistory<LatencyResult>,
    throughput: ResultHistory<ThroughputResult>,
}

/// Wraps a [`SpeedProbe`] and keeps the last few results of each kind.
///
/// The lock is only taken after the probe call returns, never across it.
/// Failures leave the history untouched and are never retried here.
pub struct ProbeRunner {
    probe: Arc<dyn SpeedProbe>,
    histories: RwLock<Histories>,
}

impl ProbeRunner {
    pub fn new(probe: Arc<dyn SpeedProbe>, capacity: usize) -> Self {
        Self {
            probe,
            histories: RwLock::new(Histories {
                latency: ResultHistory::new(capacity),
                throughput: ResultHistory::new(capacity),
            }),
        }
    }

    /// Run one latency probe.
    pub async fn run_latency(
        &self,
        cancel: &CancellationToken,
    ) -> Result<LatencyResult, ProbeError> {
        let result = self.probe.ping(cancel).await?;
        debug!(server = %result.target, latency_ms = result.latency.as_millis() as u64, "latency probe finished");

        self.histories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .latency
            .push(result.clone());
        Ok(result)
    }

    /// Run one throughput probe.
    pub async fn run_throughput(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ProbeError> {
        let result = self.probe.speedtest(cancel).await?;
        debug!(
            server = %result.target,
            download_mbps = result.download_mbps,
            upload_mbps = result.upload_mbps,
            "throughput probe finished"
        );

        self.histories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .throughput
            .push(result.clone());
        Ok(result)
    }

    /// Copies of both histories, most recent first.
    pub fn snapshot(&self) -> (Vec<LatencyResult>, Vec<ThroughputResult>) {
        let h = self.histories.read().unwrap_or_else(PoisonError::into_inner);
        (h.latency.to_vec(), h.throughput.to_vec())
    }

    pub fn capacity(&self) -> usize {
        self.histories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latency
            .capacity()
    }
}
