//! Synthetic alert generator for exercising a running Klaxon server.
//!
//! Posts a catalog of storage-flavored alerts to the webhook endpoint, then
//! a resolution notification for one of them, so the full ingest → correlate
//! → resolve path can be watched end to end. Cycles are gated through a
//! [`CooldownTracker`] exactly the way a real generation loop would be:
//! running several cycles back-to-back re-sends nothing until the cooldown
//! elapses.

use std::env;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use klaxon::cooldown::{CooldownTracker, DEFAULT_COOLDOWN_MINUTES};

/// Default webhook endpoint of a locally running server.
const DEFAULT_WEBHOOK_URL: &str = "http://localhost:8080/webhook/alert";

/// Default number of generation cycles to run.
const DEFAULT_CYCLES: u32 = 1;

/// Default pause between cycles, in seconds.
const DEFAULT_INTERVAL_SECS: u64 = 5;

/// One synthetic alert definition.
struct TestAlert {
    condition: &'static str,
    instance: &'static str,
    severity: &'static str,
    summary: &'static str,
    description: &'static str,
}

const CATALOG: [TestAlert; 4] = [
    TestAlert {
        condition: "DiskSpaceCritical",
        instance: "storage-server-01",
        severity: "critical",
        summary: "Critical disk space usage on primary data partition",
        description: "Disk usage on /var/lib/data has reached 95% capacity. \
                      Available space: 2.1GB of 500GB total.",
    },
    TestAlert {
        condition: "InodeExhaustion",
        instance: "web-server-03",
        severity: "critical",
        summary: "Inode exhaustion detected on log partition",
        description: "Inode usage on /var/log has reached 98%. File creation \
                      will fail soon. Free inodes: 8.",
    },
    TestAlert {
        condition: "HighIoWait",
        instance: "database-server-04",
        severity: "warning",
        summary: "High I/O wait time detected",
        description: "I/O wait percentage is 45%, indicating storage \
                      bottlenecks. Current load average: 8.2, 7.8, 6.9.",
    },
    TestAlert {
        condition: "SmartHealthWarning",
        instance: "storage-server-05",
        severity: "warning",
        summary: "SMART attribute threshold exceeded",
        description: "Disk /dev/sdc shows declining SMART attributes. \
                      Reallocated sectors: 45 (threshold: 36).",
    },
];

/// Wrap one alert in the monitoring-source group format the webhook expects.
fn group_payload(alert: &TestAlert, status: &str) -> Value {
    json!({
        "version": "4",
        "groupKey": format!("{}:{}", alert.condition, alert.severity),
        "status": status,
        "receiver": "klaxon-webhook",
        "groupLabels": { "alertname": alert.condition },
        "commonLabels": {
            "alertname": alert.condition,
            "instance": alert.instance,
            "severity": alert.severity,
        },
        "commonAnnotations": { "summary": alert.summary },
        "alerts": [{
            "status": status,
            "labels": {
                "alertname": alert.condition,
                "instance": alert.instance,
                "severity": alert.severity,
                "alerttype": "storage",
            },
            "annotations": {
                "summary": alert.summary,
                "description": alert.description,
            },
            "startsAt": Utc::now().to_rfc3339(),
        }],
    })
}

async fn post_alert(client: &Client, webhook_url: &str, payload: &Value) -> bool {
    match client.post(webhook_url).json(payload).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            warn!(status = %response.status(), "Webhook rejected alert");
            false
        }
        Err(e) => {
            warn!(error = %e, "Failed to reach webhook");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("send_test_alerts=info".parse()?))
        .init();

    let webhook_url =
        env::var("KLAXON_WEBHOOK_URL").unwrap_or_else(|_| DEFAULT_WEBHOOK_URL.to_string());
    let cycles: u32 = env::var("KLAXON_GENERATOR_CYCLES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CYCLES);
    let interval_secs: u64 = env::var("KLAXON_GENERATOR_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_INTERVAL_SECS);

    info!(webhook_url = %webhook_url, cycles, "Starting test alert generator");

    let client = Client::builder()
        .timeout(StdDuration::from_secs(10))
        .build()?;
    let cooldown = CooldownTracker::new();
    let cooldown_window = Duration::minutes(DEFAULT_COOLDOWN_MINUTES);

    let mut sent = 0u32;
    let mut suppressed = 0u32;

    for cycle in 1..=cycles {
        info!(cycle, "Running generation cycle");

        for alert in &CATALOG {
            let key = format!("{}_{}_{}", alert.condition, alert.instance, alert.severity);
            if !cooldown.should_fire(&key, cooldown_window, Utc::now()) {
                suppressed += 1;
                continue;
            }

            if post_alert(&client, &webhook_url, &group_payload(alert, "firing")).await {
                info!(
                    condition = alert.condition,
                    instance = alert.instance,
                    severity = alert.severity,
                    "Sent alert"
                );
                sent += 1;
            }
        }

        if cycle < cycles {
            tokio::time::sleep(StdDuration::from_secs(interval_secs)).await;
        }
    }

    // Resolution notification for one of the firing conditions, so the
    // resolve path gets traffic too. Resolutions bypass the cooldown: a
    // recovery should never be suppressed.
    if post_alert(&client, &webhook_url, &group_payload(&CATALOG[2], "resolved")).await {
        info!(condition = CATALOG[2].condition, "Sent resolution");
        sent += 1;
    }

    info!(sent, suppressed, "Generator finished");

    Ok(())
}
