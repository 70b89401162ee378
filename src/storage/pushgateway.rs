//! Prometheus Pushgateway sink.
//!
//! Gauges live inside the sink instance rather than a process-wide registry;
//! each record call updates them and pushes the whole exposition to
//! `<url>/metrics/job/<job>`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{MetricsSink, StorageError};
use crate::probes::{LatencyResult, ThroughputResult};

const DOWNLOAD: &str = "network_download_speed_mbps";
const UPLOAD: &str = "network_upload_speed_mbps";
const PING: &str = "network_ping_latency_ms";

/// Gauges keyed by metric name, then by `server` label.
#[derive(Debug, Default)]
struct Gauges {
    values: BTreeMap<&'static str, BTreeMap<String, f64>>,
}

impl Gauges {
    fn set(&mut self, metric: &'static str, server: &str, value: f64) {
        self.values
            .entry(metric)
            .or_default()
            .insert(server.to_string(), value);
    }

    /// Prometheus text exposition format (0.0.4).
    fn render(&self) -> String {
        let mut out = String::new();
        for (metric, help) in [
            (DOWNLOAD, "Network download speed in Mbps"),
            (UPLOAD, "Network upload speed in Mbps"),
            (PING, "Network ping latency in milliseconds"),
        ] {
            let Some(series) = self.values.get(metric) else {
                continue;
            };
            let _ = writeln!(out, "# HELP {metric} {help}");
            let _ = writeln!(out, "# TYPE {metric} gauge");
            for (server, value) in series {
                let _ = writeln!(out, "{metric}{{server=\"{}\"}} {value}", escape_label(server));
            }
        }
        out
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

pub struct PushGatewaySink {
    client: Client,
    push_url: String,
    gauges: Mutex<Gauges>,
}

impl PushGatewaySink {
    pub fn new(gateway_url: &str, job: &str) -> Result<Self, StorageError> {
        if gateway_url.trim().is_empty() {
            return Err(StorageError::Push("push gateway URL cannot be empty".into()));
        }
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            push_url: format!("{}/metrics/job/{}", gateway_url.trim_end_matches('/'), job),
            gauges: Mutex::new(Gauges::default()),
        })
    }

    fn update(&self, f: impl FnOnce(&mut Gauges)) -> String {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut gauges);
        gauges.render()
    }

    /// POST the exposition; gives up with [`StorageError::Cancelled`] once
    /// `cancel` fires.
    async fn push(&self, cancel: &CancellationToken, body: String) -> Result<(), StorageError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(StorageError::Cancelled),
            res = self.send(body) => res,
        }
    }

    async fn send(&self, body: String) -> Result<(), StorageError> {
        let resp = self
            .client
            .post(&self.push_url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(url = %self.push_url, "pushed metrics");
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricsSink for PushGatewaySink {
    async fn record_latency(
        &self,
        cancel: &CancellationToken,
        result: &LatencyResult,
    ) -> Result<(), StorageError> {
        let body = self.update(|g| {
            g.set(PING, &result.target, result.latency.as_secs_f64() * 1000.0);
        });
        self.push(cancel, body).await
    }

    async fn record_throughput(
        &self,
        cancel: &CancellationToken,
        result: &ThroughputResult,
    ) -> Result<(), StorageError> {
        let body = self.update(|g| {
            g.set(DOWNLOAD, &result.target, result.download_mbps);
            g.set(UPLOAD, &result.target, result.upload_mbps);
            g.set(PING, &result.target, result.latency.as_secs_f64() * 1000.0);
        });
        self.push(cancel, body).await
    }

    async fn close(&self, cancel: &CancellationToken) {
        let body = self.update(|_| {});
        if body.is_empty() {
            return;
        }
        if let Err(e) = self.push(cancel, body).await {
            error!(error = %e, "final metrics push failed");
        }
    }

    fn render_metrics(&self) -> Option<String> {
        Some(self.gauges.lock().unwrap_or_else(PoisonError::into_inner).render())
    }
}
