//! HTTP API handlers for Klaxon.
//!
//! The HTTP surface is a thin shell over the library operations: the webhook
//! route feeds the normalizer and store, the `/api` routes expose reads and
//! lifecycle updates, and nothing here talks to external ticketing or chat
//! systems — that is the dispatch layer's job, informed by the correlation
//! result returned from ingestion.
//!
//! Status-code conventions:
//!
//! - A rejected lifecycle transition or repeated ticket link is `409`, not
//!   `5xx`: those are expected outcomes of racing callers and are logged at
//!   `info`, never as errors.
//! - Any persistence failure is `500`, so the monitoring source retries
//!   rather than believing an unstored alert was accepted.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::correlate::find_open_ticket;
use crate::model::{
    AlertDetailResponse, AlertFilter, AlertListResponse, AlertPayload, AlertsQuery,
    HealthResponse, IngestResponse, LinkTicketRequest, LinkTicketResponse, UpdateStatusRequest,
    UpdateStatusResponse,
};
use crate::normalize::normalize;
use crate::stats;
use crate::store::AlertStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: AlertStore,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/alert", post(ingest_alert))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:alert_id", get(get_alert))
        .route("/api/alerts/:alert_id/status", put(update_alert_status))
        .route("/api/alerts/:alert_id/ticket", post(link_ticket))
        .route("/api/stats", get(get_stats))
        .route("/health", get(health_check))
        .with_state(state)
}

/// POST /webhook/alert - Ingest one alert group from a monitoring source.
///
/// Normalizes the payload, stores the canonical alert, and reports whether
/// an external ticket is already open for the alert's signature so the
/// dispatch layer can skip creating a duplicate.
///
/// A payload with no member alerts is acknowledged with "no alerts to
/// process" rather than rejected; a payload that fails to parse at all is
/// `400`. A storage failure is `500` — the alert was not recorded and the
/// source must not believe otherwise.
#[instrument(skip(state, raw))]
pub async fn ingest_alert(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<IngestResponse>, StatusCode> {
    let payload: AlertPayload = match serde_json::from_value(raw.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected malformed alert payload");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let Some(draft) = normalize(&payload, raw) else {
        info!("Webhook payload contained no alerts");
        return Ok(Json(IngestResponse {
            message: "no alerts to process".to_string(),
            alert_id: None,
            signature: None,
            existing_ticket: None,
        }));
    };

    let signature = draft.signature();

    let alert_id = match state.store.store(&draft).await {
        Ok(alert_id) => alert_id,
        Err(e) => {
            warn!(signature = %signature, error = %e, "Failed to store alert");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let existing_ticket = match find_open_ticket(&state.store, &signature).await {
        Ok(link) => link,
        Err(e) => {
            warn!(signature = %signature, error = %e, "Ticket correlation failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    info!(
        alert_id = %alert_id,
        signature = %signature,
        severity = %draft.severity,
        has_open_ticket = existing_ticket.is_some(),
        "Alert recorded"
    );

    Ok(Json(IngestResponse {
        message: "alert recorded".to_string(),
        alert_id: Some(alert_id),
        signature: Some(signature),
        existing_ticket,
    }))
}

/// GET /api/alerts - List stored alerts, newest first.
///
/// # Query Parameters
///
/// - `limit` (optional): result bound, default 50
/// - `severity` (optional): filter by severity name
/// - `status` (optional): filter by lifecycle status name
#[instrument(skip(state))]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertListResponse>, StatusCode> {
    let mut filter = AlertFilter::default();
    if let Some(severity) = &query.severity {
        filter.severity = Some(severity.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
    }
    if let Some(status) = &query.status {
        filter.status = Some(status.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
    }

    match state.store.list(&filter, query.limit).await {
        Ok(alerts) => {
            info!(count = alerts.len(), "Alerts listed");
            Ok(Json(AlertListResponse {
                count: alerts.len(),
                alerts,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Failed to list alerts");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/alerts/{alert_id} - One alert with its full audit trail.
#[instrument(skip(state))]
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> Result<Json<AlertDetailResponse>, StatusCode> {
    let alert = match state.store.get(&alert_id).await {
        Ok(Some(alert)) => alert,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(alert_id = %alert_id, error = %e, "Failed to fetch alert");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match state.store.history(&alert_id).await {
        Ok(history) => Ok(Json(AlertDetailResponse { alert, history })),
        Err(e) => {
            warn!(alert_id = %alert_id, error = %e, "Failed to fetch alert history");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /api/alerts/{alert_id}/status - Apply a lifecycle transition.
///
/// `409` when the transition is not an edge of the state machine or the
/// alert is unknown; nothing is written in that case. This is the normal
/// answer to a racing or stale caller, so it is logged at `info`.
#[instrument(skip(state, request))]
pub async fn update_alert_status(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, StatusCode> {
    let new_status = request
        .status
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    match state
        .store
        .update_status(&alert_id, new_status, request.metadata.as_ref())
        .await
    {
        Ok(true) => {
            info!(alert_id = %alert_id, status = %new_status, "Alert status updated");
            Ok(Json(UpdateStatusResponse {
                alert_id,
                status: new_status,
            }))
        }
        Ok(false) => {
            info!(alert_id = %alert_id, status = %new_status, "Status transition rejected");
            Err(StatusCode::CONFLICT)
        }
        Err(e) => {
            warn!(alert_id = %alert_id, error = %e, "Failed to update alert status");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/alerts/{alert_id}/ticket - Record the external ticket created
/// for an alert.
///
/// `409` when the alert already carries a ticket or the ticket key is
/// attached to another alert; idempotent-safe for retrying callers.
#[instrument(skip(state, request))]
pub async fn link_ticket(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(request): Json<LinkTicketRequest>,
) -> Result<Json<LinkTicketResponse>, StatusCode> {
    match state
        .store
        .link_ticket(&alert_id, &request.ticket_key, request.ticket_url.as_deref())
        .await
    {
        Ok(true) => {
            info!(alert_id = %alert_id, ticket_key = %request.ticket_key, "Ticket linked");
            Ok(Json(LinkTicketResponse {
                alert_id,
                ticket_key: request.ticket_key,
            }))
        }
        Ok(false) => {
            info!(alert_id = %alert_id, ticket_key = %request.ticket_key, "Ticket link rejected");
            Err(StatusCode::CONFLICT)
        }
        Err(e) => {
            warn!(alert_id = %alert_id, error = %e, "Failed to link ticket");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/stats - Aggregate alert counts.
#[instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<stats::StatsSummary>, StatusCode> {
    match stats::summary(&state.store, Utc::now()).await {
        Ok(summary) => {
            info!(total = summary.total_alerts, "Stats queried");
            Ok(Json(summary))
        }
        Err(e) => {
            warn!(error = %e, "Failed to compute stats");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Liveness plus store reachability.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_connected = state.store.ping().await.is_ok();
    Json(HealthResponse {
        status: "ok",
        database_connected,
    })
}
