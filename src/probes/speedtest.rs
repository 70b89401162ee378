//! HTTP speed test client: latency, download, and upload against a
//! Cloudflare-style speed endpoint (`/__down?bytes=N`, `/__up`).

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LatencyResult, ProbeError, SpeedProbe, ThroughputResult};
use crate::config::{ProbeConfig, SpeedServer};

/// [`SpeedProbe`] backed by plain HTTP transfers.
pub struct SpeedTestClient {
    client: Client,
    config: ProbeConfig,
}

impl SpeedTestClient {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(concat!("linkwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Best of `ping_samples` zero-byte round trips to `server`.
    async fn measure_latency(&self, server: &SpeedServer) -> Result<Duration, ProbeError> {
        let url = format!("{}/__down?bytes=0", server.url.trim_end_matches('/'));
        let mut best: Option<Duration> = None;

        for _ in 0..self.config.ping_samples {
            let start = Instant::now();
            let resp = self
                .client
                .get(&url)
                .timeout(self.config.ping_timeout())
                .send()
                .await?
                .error_for_status()?;
            resp.bytes().await?;
            let rtt = start.elapsed();
            best = Some(best.map_or(rtt, |b| b.min(rtt)));
        }

        best.ok_or(ProbeError::NoServers)
    }

    /// First configured server that answers a latency measurement.
    async fn select_server(&self) -> Result<(&SpeedServer, Duration), ProbeError> {
        for server in &self.config.servers {
            match self.measure_latency(server).await {
                Ok(latency) => {
                    debug!(server = %server.name, latency_ms = latency.as_millis() as u64, "selected server");
                    return Ok((server, latency));
                }
                Err(e) => {
                    warn!(server = %server.name, error = %e, "server unavailable, trying next");
                }
            }
        }
        Err(ProbeError::NoServers)
    }

    async fn download(&self, server: &SpeedServer) -> Result<f64, ProbeError> {
        let url = format!(
            "{}/__down?bytes={}",
            server.url.trim_end_matches('/'),
            self.config.download_bytes
        );
        info!(server = %server.name, "testing download speed");

        let start = Instant::now();
        let mut resp = self
            .client
            .get(&url)
            .timeout(self.config.transfer_timeout())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProbeError::Download(e.to_string()))?;

        let mut received: u64 = 0;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| ProbeError::Download(e.to_string()))?
        {
            received += chunk.len() as u64;
        }

        Ok(mbps(received, start.elapsed()))
    }

    async fn upload(&self, server: &SpeedServer) -> Result<f64, ProbeError> {
        let url = format!("{}/__up", server.url.trim_end_matches('/'));
        info!(server = %server.name, "testing upload speed");

        let body = bytes::Bytes::from(vec![0u8; self.config.upload_bytes as usize]);
        let sent = body.len() as u64;

        let start = Instant::now();
        self.client
            .post(&url)
            .timeout(self.config.transfer_timeout())
            .body(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProbeError::Upload(e.to_string()))?;

        Ok(mbps(sent, start.elapsed()))
    }
}

#[async_trait::async_trait]
impl SpeedProbe for SpeedTestClient {
    async fn ping(&self, cancel: &CancellationToken) -> Result<LatencyResult, ProbeError> {
        let (server, latency) = cancellable(cancel, self.select_server()).await?;
        Ok(LatencyResult {
            target: server.name.clone(),
            observed_at: Utc::now(),
            latency,
        })
    }

    async fn speedtest(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ProbeError> {
        let (server, latency) = cancellable(cancel, self.select_server()).await?;

        let (download_mbps, upload_mbps) =
            cancellable(cancel, measure_both(self.download(server), self.upload(server))).await?;

        Ok(ThroughputResult {
            target: server.name.clone(),
            observed_at: Utc::now(),
            download_mbps,
            upload_mbps,
            latency,
        })
    }
}

/// Run the download and upload measurements concurrently.
///
/// Both are always awaited to completion; if either fails the result is a
/// single error carrying every failure.
pub async fn measure_both<D, U>(download: D, upload: U) -> Result<(f64, f64), ProbeError>
where
    D: Future<Output = Result<f64, ProbeError>>,
    U: Future<Output = Result<f64, ProbeError>>,
{
    match tokio::join!(download, upload) {
        (Ok(down), Ok(up)) => Ok((down, up)),
        (down, up) => {
            let errs = [down.err(), up.err()].into_iter().flatten().collect();
            Err(ProbeError::aggregate(errs).unwrap_or(ProbeError::NoServers))
        }
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        res = fut => res,
    }
}

fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}
