//! Integration tests for the Klaxon API endpoints.
//!
//! These tests drive the full request/response cycle through the HTTP API,
//! including the ticket-deduplication workflow across repeated occurrences
//! of one fault signature.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use klaxon::api::{AppState, router};
use klaxon::store::AlertStore;

async fn create_test_server() -> TestServer {
    let store = AlertStore::new("sqlite::memory:").await.unwrap();
    TestServer::new(router(AppState { store })).unwrap()
}

fn alert_body(condition: &str, instance: &str, severity: &str, status: &str) -> Value {
    json!({
        "status": status,
        "commonLabels": {
            "alertname": condition,
            "instance": instance,
            "severity": severity,
        },
        "alerts": [{
            "status": status,
            "labels": {
                "alertname": condition,
                "instance": instance,
                "severity": severity,
            },
            "annotations": {
                "summary": format!("{condition} detected on {instance}"),
            },
            "startsAt": "2026-01-01T12:00:00.000Z",
        }],
    })
}

/// Ingest one alert and return its assigned id.
async fn ingest(server: &TestServer, condition: &str, instance: &str, severity: &str) -> String {
    let response = server
        .post("/webhook/alert")
        .json(&alert_body(condition, instance, severity, "firing"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    body["alert_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database_connected"], true);
}

#[tokio::test]
async fn test_ingest_alert() {
    let server = create_test_server().await;

    let response = server
        .post("/webhook/alert")
        .json(&alert_body("DiskFull", "host-1", "critical", "firing"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "alert recorded");
    assert!(body["alert_id"].as_str().unwrap().starts_with("DiskFull_host-1_"));
    assert_eq!(body["signature"], "DiskFull_host-1");
    assert!(body["existing_ticket"].is_null());
}

#[tokio::test]
async fn test_ingest_empty_payload_is_acknowledged() {
    let server = create_test_server().await;

    let response = server
        .post("/webhook/alert")
        .json(&json!({ "status": "firing", "alerts": [] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "no alerts to process");
    assert!(body["alert_id"].is_null());
}

#[tokio::test]
async fn test_ingest_malformed_payload_is_rejected() {
    let server = create_test_server().await;

    let response = server.post("/webhook/alert").json(&json!([1, 2, 3])).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_fills_unknown_defaults() {
    let server = create_test_server().await;

    let response = server
        .post("/webhook/alert")
        .json(&json!({
            "status": "firing",
            "alerts": [{ "labels": {}, "annotations": {} }],
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["signature"], "unknown_unknown");
}

#[tokio::test]
async fn test_get_alert_with_history() {
    let server = create_test_server().await;
    let alert_id = ingest(&server, "DiskFull", "host-1", "critical").await;

    let response = server.get(&format!("/api/alerts/{alert_id}")).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["alert"]["alert_id"], alert_id.as_str());
    assert_eq!(body["alert"]["status"], "firing");
    assert_eq!(body["alert"]["severity"], "critical");

    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["action"], "created");
}

#[tokio::test]
async fn test_get_unknown_alert_is_404() {
    let server = create_test_server().await;

    let response = server.get("/api/alerts/DiskFull_host-1_0").await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_alerts_with_filters() {
    let server = create_test_server().await;
    ingest(&server, "DiskFull", "host-1", "critical").await;
    ingest(&server, "DiskFull", "host-2", "critical").await;
    ingest(&server, "HighIoWait", "host-3", "warning").await;

    let response = server.get("/api/alerts?severity=critical").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 2);

    let response = server.get("/api/alerts?limit=1").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_list_alerts_rejects_unknown_severity() {
    let server = create_test_server().await;

    let response = server.get("/api/alerts?severity=sev1").await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_update_and_terminal_rejection() {
    let server = create_test_server().await;
    let alert_id = ingest(&server, "DiskFull", "host-1", "critical").await;

    // firing -> escalated, recording the ticket in side metadata
    let response = server
        .put(&format!("/api/alerts/{alert_id}/status"))
        .json(&json!({ "status": "escalated", "metadata": { "ticket": "OPS-1" } }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "escalated");

    // escalated -> resolved
    server
        .put(&format!("/api/alerts/{alert_id}/status"))
        .json(&json!({ "status": "resolved" }))
        .await
        .assert_status_ok();

    // resolved is terminal: the transition is rejected and nothing changes
    let response = server
        .put(&format!("/api/alerts/{alert_id}/status"))
        .json(&json!({ "status": "assigned" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let response = server.get(&format!("/api/alerts/{alert_id}")).await;
    let body: Value = response.json();
    assert_eq!(body["alert"]["status"], "resolved");
    assert_eq!(body["alert"]["metadata"]["ticket"], "OPS-1");
}

#[tokio::test]
async fn test_status_update_rejects_unknown_status_name() {
    let server = create_test_server().await;
    let alert_id = ingest(&server, "DiskFull", "host-1", "critical").await;

    let response = server
        .put(&format!("/api/alerts/{alert_id}/status"))
        .json(&json!({ "status": "acknowledged" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_link_is_idempotent_safe() {
    let server = create_test_server().await;
    let alert_id = ingest(&server, "DiskFull", "host-1", "critical").await;

    let response = server
        .post(&format!("/api/alerts/{alert_id}/ticket"))
        .json(&json!({
            "ticket_key": "OPS-1",
            "ticket_url": "https://tickets.example.com/OPS-1",
        }))
        .await;
    response.assert_status_ok();

    // A retrying caller gets a quiet conflict, and the original link stays.
    let response = server
        .post(&format!("/api/alerts/{alert_id}/ticket"))
        .json(&json!({ "ticket_key": "OPS-1" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let response = server.get(&format!("/api/alerts/{alert_id}")).await;
    let body: Value = response.json();
    assert_eq!(body["alert"]["ticket"]["ticket_key"], "OPS-1");
}

#[tokio::test]
async fn test_repeated_signature_reuses_open_ticket() {
    let server = create_test_server().await;

    // First occurrence: stored, escalated, and linked to OPS-1.
    let first = ingest(&server, "DiskFull", "host-1", "critical").await;
    server
        .put(&format!("/api/alerts/{first}/status"))
        .json(&json!({ "status": "escalated", "metadata": { "ticket": "OPS-1" } }))
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/alerts/{first}/ticket"))
        .json(&json!({ "ticket_key": "OPS-1" }))
        .await
        .assert_status_ok();

    // Second occurrence of the same signature: a new alert record, but the
    // ingest response points the dispatch layer at the open OPS-1 ticket.
    let response = server
        .post("/webhook/alert")
        .json(&alert_body("DiskFull", "host-1", "critical", "firing"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let second = body["alert_id"].as_str().unwrap();
    assert_ne!(second, first);
    assert_eq!(body["existing_ticket"]["ticket_key"], "OPS-1");
    assert_eq!(body["existing_ticket"]["alert_id"], first.as_str());

    // Once the first occurrence resolves, the signature has no open ticket
    // and the next occurrence warrants a fresh one.
    server
        .put(&format!("/api/alerts/{first}/status"))
        .json(&json!({ "status": "resolved" }))
        .await
        .assert_status_ok();

    let response = server
        .post("/webhook/alert")
        .json(&alert_body("DiskFull", "host-1", "critical", "firing"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["existing_ticket"].is_null());
}

#[tokio::test]
async fn test_resolved_ingest_starts_in_resolved_state() {
    let server = create_test_server().await;

    let response = server
        .post("/webhook/alert")
        .json(&alert_body("DiskFull", "host-1", "warning", "resolved"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let alert_id = body["alert_id"].as_str().unwrap();

    let response = server.get(&format!("/api/alerts/{alert_id}")).await;
    let body: Value = response.json();
    assert_eq!(body["alert"]["status"], "resolved");
}

#[tokio::test]
async fn test_stats_endpoint() {
    let server = create_test_server().await;
    ingest(&server, "DiskFull", "host-1", "critical").await;
    ingest(&server, "DiskFull", "host-2", "critical").await;
    let linked = ingest(&server, "HighIoWait", "host-3", "warning").await;
    server
        .post(&format!("/api/alerts/{linked}/ticket"))
        .json(&json!({ "ticket_key": "OPS-7" }))
        .await
        .assert_status_ok();

    let response = server.get("/api/stats").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total_alerts"], 3);
    assert_eq!(body["by_severity"]["critical"], 2);
    assert_eq!(body["by_severity"]["warning"], 1);
    assert_eq!(body["by_status"]["firing"], 3);
    assert_eq!(body["recent_24h"], 3);
    assert_eq!(body["linked_tickets"], 1);
}

#[tokio::test]
async fn test_stats_on_empty_store() {
    let server = create_test_server().await;

    let response = server.get("/api/stats").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total_alerts"], 0);
    assert_eq!(body["recent_24h"], 0);
}

#[tokio::test]
async fn test_full_workflow() {
    let server = create_test_server().await;

    // 1. Health check
    server.get("/health").await.assert_status_ok();

    // 2. Ingest alerts across hosts
    for host in ["host-a", "host-b", "host-c"] {
        ingest(&server, "DiskFull", host, "critical").await;
    }

    // 3. Work one of them through the full lifecycle
    let worked = ingest(&server, "InodeExhaustion", "host-a", "critical").await;
    server
        .put(&format!("/api/alerts/{worked}/status"))
        .json(&json!({ "status": "assigned", "metadata": { "assignee": "oncall" } }))
        .await
        .assert_status_ok();
    server
        .put(&format!("/api/alerts/{worked}/status"))
        .json(&json!({ "status": "escalated" }))
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/alerts/{worked}/ticket"))
        .json(&json!({ "ticket_key": "OPS-42" }))
        .await
        .assert_status_ok();
    server
        .put(&format!("/api/alerts/{worked}/status"))
        .json(&json!({ "status": "resolved" }))
        .await
        .assert_status_ok();

    // 4. Its ledger recorded every step, newest first
    let response = server.get(&format!("/api/alerts/{worked}")).await;
    let body: Value = response.json();
    let actions: Vec<&str> = body["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        vec![
            "status_changed_to_resolved",
            "ticket_linked",
            "status_changed_to_escalated",
            "status_changed_to_assigned",
            "created",
        ]
    );

    // 5. Aggregates see everything
    let response = server.get("/api/stats").await;
    let body: Value = response.json();
    assert_eq!(body["total_alerts"], 4);
}
