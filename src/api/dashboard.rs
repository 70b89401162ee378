//! HTML pages for the debug server.

use askama::Template;

use crate::introspect::{ControlCommand, MonitorSnapshot};

pub struct LatencyRow {
    pub observed_at: String,
    pub target: String,
    pub latency: String,
}

pub struct ThroughputRow {
    pub observed_at: String,
    pub target: String,
    pub download: String,
    pub upload: String,
    pub latency: String,
}

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<!DOCTYPE html>
<html>
<head>
  <title>linkwatch - Monitor</title>
  <style>
    body { font-family: sans-serif; margin: 20px; }
    table { border-collapse: collapse; width: 100%; margin-bottom: 20px; }
    th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
    th { background-color: #f2f2f2; }
    form { display: inline; }
  </style>
</head>
<body>
  <p><a href="/">Home</a></p>
  <h1>Monitor</h1>

  <h2>Rate limiters</h2>
  <table>
    <tr><th>Activity</th><th>Status</th></tr>
    <tr><td>Ping</td><td>{{ ping_status }}</td></tr>
    <tr><td>Network</td><td>{{ network_status }}</td></tr>
  </table>
  {% for cmd in commands %}
  <form method="post" action="/debug/monitor/{{ cmd }}"><button type="submit">{{ cmd }}</button></form>
  {% endfor %}

  <h2>Last {{ latency.len() }} Ping Tests (Max {{ capacity }})</h2>
  {% if latency.is_empty() %}
  <p>No ping test results yet.</p>
  {% else %}
  <table>
    <tr><th>Timestamp</th><th>Target Server</th><th>Latency</th></tr>
    {% for row in latency %}
    <tr><td>{{ row.observed_at }}</td><td>{{ row.target }}</td><td>{{ row.latency }}</td></tr>
    {% endfor %}
  </table>
  {% endif %}

  <h2>Last {{ throughput.len() }} Network Speed Tests (Max {{ capacity }})</h2>
  {% if throughput.is_empty() %}
  <p>No network speed test results yet.</p>
  {% else %}
  <table>
    <tr><th>Timestamp</th><th>Target Server</th><th>Download (Mbps)</th><th>Upload (Mbps)</th><th>Ping Latency</th></tr>
    {% for row in throughput %}
    <tr><td>{{ row.observed_at }}</td><td>{{ row.target }}</td><td>{{ row.download }}</td><td>{{ row.upload }}</td><td>{{ row.latency }}</td></tr>
    {% endfor %}
  </table>
  {% endif %}
</body>
</html>"#
)]
pub struct MonitorPage {
    pub ping_status: String,
    pub network_status: String,
    pub capacity: usize,
    pub commands: Vec<&'static str>,
    pub latency: Vec<LatencyRow>,
    pub throughput: Vec<ThroughputRow>,
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_ms(d: std::time::Duration) -> String {
    format!("{:.1} ms", d.as_secs_f64() * 1000.0)
}

impl From<&MonitorSnapshot> for MonitorPage {
    fn from(snap: &MonitorSnapshot) -> Self {
        Self {
            ping_status: snap.ping_limiter_status.clone(),
            network_status: snap.network_limiter_status.clone(),
            capacity: snap.history_capacity,
            commands: ControlCommand::ALL.iter().map(|c| c.as_str()).collect(),
            latency: snap
                .recent_latency
                .iter()
                .map(|r| LatencyRow {
                    observed_at: r.observed_at.format(TIME_FORMAT).to_string(),
                    target: r.target.clone(),
                    latency: fmt_ms(r.latency),
                })
                .collect(),
            throughput: snap
                .recent_throughput
                .iter()
                .map(|r| ThroughputRow {
                    observed_at: r.observed_at.format(TIME_FORMAT).to_string(),
                    target: r.target.clone(),
                    download: format!("{:.2}", r.download_mbps),
                    upload: format!("{:.2}", r.upload_mbps),
                    latency: fmt_ms(r.latency),
                })
                .collect(),
        }
    }
}

pub struct PageLink {
    pub path: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Debug pages listed on the index.
pub const PAGES: &[PageLink] = &[
    PageLink {
        path: "/debug/monitor",
        name: "Monitor",
        description: "Rate limiter status, recent results, pause/resume controls.",
    },
    PageLink {
        path: "/debug/config",
        name: "Configuration",
        description: "Effective configuration as JSON.",
    },
    PageLink {
        path: "/metrics",
        name: "Metrics",
        description: "Current metrics in Prometheus text format.",
    },
    PageLink {
        path: "/health",
        name: "Health",
        description: "Liveness and version.",
    },
];

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<!DOCTYPE html>
<html>
<head><title>linkwatch - Debug Home</title></head>
<body>
  <h1>linkwatch {{ version }}</h1>
  <ul>
  {% for page in pages %}
    <li><a href="{{ page.path|safe }}">{{ page.name }}</a> - {{ page.description }}</li>
  {% endfor %}
  </ul>
</body>
</html>"#
)]
pub struct IndexPage {
    pub version: &'static str,
    pub pages: &'static [PageLink],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::LatencyResult;
    use crate::scheduler::RateState;
    use std::time::Duration;

    fn snapshot() -> MonitorSnapshot {
        let state = RateState {
            configured_per_sec: 1.0,
            current_per_sec: 1.0,
            burst: 1,
        };
        MonitorSnapshot {
            ping_limiter_status: "Paused".into(),
            network_limiter_status: "0.016 / 3".into(),
            ping_limiter: state.clone(),
            network_limiter: state,
            history_capacity: 10,
            recent_latency: vec![LatencyResult {
                target: "<edge>".into(),
                observed_at: chrono::Utc::now(),
                latency: Duration::from_millis(1250),
            }],
            recent_throughput: vec![],
        }
    }

    #[test]
    fn test_monitor_page_renders_and_escapes() {
        let html = MonitorPage::from(&snapshot()).render().unwrap();
        assert!(html.contains("Paused"));
        assert!(html.contains("1250.0 ms"));
        assert!(html.contains("&lt;edge&gt;"));
        assert!(html.contains("No network speed test results yet."));
        assert!(html.contains("/debug/monitor/pause-network"));
    }

    #[test]
    fn test_index_lists_pages() {
        let html = IndexPage {
            version: "0.0.0",
            pages: PAGES,
        }
        .render()
        .unwrap();
        for page in PAGES {
            assert!(html.contains(page.path));
        }
    }
}
