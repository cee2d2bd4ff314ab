//! Data models for Klaxon.
//!
//! The central type is [`Alert`]: a normalized, durable record of one fault
//! occurrence reported by a monitoring source. Repeated occurrences of the
//! same underlying condition are *not* merged into one record; each accepted
//! ingestion creates its own `Alert`, and occurrences are correlated only
//! through their shared [`Alert::signature`].
//!
//! Inbound webhook payloads ([`AlertPayload`]) are loosely structured on
//! purpose: every field a monitoring source might omit is optional here and
//! given an explicit default during normalization, so partial observability
//! data is still recorded rather than rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Literal default for identity fields a source failed to report.
pub const UNKNOWN: &str = "unknown";

/// Severity reported by the monitoring source.
///
/// Immutable after creation: an escalation in severity is modeled as a new
/// `Alert`, never as a mutation of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Unknown,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }

    /// Lossy parse used when reading source labels: anything that is not a
    /// recognized severity collapses to [`Severity::Unknown`].
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Severity::Unknown)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "unknown" => Ok(Severity::Unknown),
            other => Err(format!("unrecognized severity: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert.
///
/// The state machine has exactly these edges:
///
/// ```text
/// firing    -> assigned     (human acknowledgment)
/// firing    -> escalated    (ticket created)
/// firing    -> resolved     (source reports resolution)
/// assigned  -> escalated
/// assigned  -> resolved
/// escalated -> resolved
/// ```
///
/// `resolved` is terminal. Self-transitions and every edge not listed above
/// are illegal; [`AlertStatus::can_transition_to`] is the single source of
/// truth and the store's guarded updates are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Assigned,
    Escalated,
    Resolved,
}

impl AlertStatus {
    /// Every lifecycle state, used to derive legal-predecessor sets.
    pub const ALL: [AlertStatus; 4] = [
        AlertStatus::Firing,
        AlertStatus::Assigned,
        AlertStatus::Escalated,
        AlertStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Assigned => "assigned",
            AlertStatus::Escalated => "escalated",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Whether the edge `self -> next` exists in the lifecycle state machine.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (Firing, Assigned)
                | (Firing, Escalated)
                | (Firing, Resolved)
                | (Assigned, Escalated)
                | (Assigned, Resolved)
                | (Escalated, Resolved)
        )
    }

    /// States from which `next` may legally be reached.
    pub fn legal_predecessors(next: AlertStatus) -> Vec<AlertStatus> {
        Self::ALL
            .into_iter()
            .filter(|prior| prior.can_transition_to(next))
            .collect()
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firing" => Ok(AlertStatus::Firing),
            "assigned" => Ok(AlertStatus::Assigned),
            "escalated" => Ok(AlertStatus::Escalated),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unrecognized alert status: {other}")),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link to the external incident ticket associated with an alert.
///
/// Absent until the dispatch layer reports a created ticket; once set it is
/// never cleared. The store enforces that a given `ticket_key` is attached
/// to at most one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    pub ticket_key: String,
    pub ticket_url: Option<String>,
    pub linked_at: DateTime<Utc>,
}

/// A normalized, durable fault record.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Stable identity assigned at store time; unique and never reused.
    pub alert_id: String,

    /// The fault type, e.g. "DiskSpaceCritical".
    pub condition: String,

    /// The entity the fault applies to, e.g. a host or device.
    pub target: String,

    pub severity: Severity,
    pub status: AlertStatus,

    /// Free-form key/value pairs attached at creation; immutable.
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,

    /// The original inbound payload, retained verbatim for audit.
    pub raw_payload: Value,

    /// Side annotation merged in by status updates; never touches `labels`.
    pub metadata: Option<Value>,

    pub ticket: Option<TicketRef>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Correlation key for repeated occurrences of the same fault:
    /// `condition + "_" + target`.
    pub fn signature(&self) -> String {
        signature(&self.condition, &self.target)
    }
}

/// Build the correlation signature for a condition/target pair.
pub fn signature(condition: &str, target: &str) -> String {
    format!("{condition}_{target}")
}

/// Output of the normalizer: an alert with identity and timestamps not yet
/// assigned. Passed to [`crate::store::AlertStore::store`].
#[derive(Debug, Clone, Serialize)]
pub struct AlertDraft {
    pub condition: String,
    pub target: String,
    pub severity: Severity,
    /// Initial lifecycle state as reported by the source: `firing`, or
    /// `resolved` for a resolution notification.
    pub status: AlertStatus,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub raw_payload: Value,
}

impl AlertDraft {
    pub fn signature(&self) -> String {
        signature(&self.condition, &self.target)
    }
}

/// One append-only audit ledger entry.
///
/// Entries are never updated or deleted; every successful alert mutation
/// appends exactly one.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub alert_id: String,
    pub ts: DateTime<Utc>,
    /// `created`, `status_changed_to_<status>`, or `ticket_linked`.
    pub action: String,
    pub snapshot: Value,
}

/// Optional filters for listing alerts.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
}

/// Derived view returned by the ticket correlator: the most recent ticket
/// still open for a signature, with the alert it is attached to.
#[derive(Debug, Clone, Serialize)]
pub struct TicketLink {
    pub ticket_key: String,
    pub ticket_url: Option<String>,
    pub linked_at: DateTime<Utc>,
    pub alert_id: String,
    pub alert_status: AlertStatus,
}

// ============================================================================
// Inbound webhook payload
// ============================================================================

/// Loosely-structured alert group as posted by a monitoring source.
///
/// Shaped like an Alertmanager webhook body: a group-level status, common
/// labels/annotations, and a list of member alerts. Everything is optional;
/// normalization fills defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    /// `firing` or `resolved`; anything else is treated as `firing`.
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, rename = "commonLabels")]
    pub common_labels: HashMap<String, String>,

    #[serde(default, rename = "commonAnnotations")]
    pub common_annotations: HashMap<String, String>,

    /// Member alerts. An empty list means "nothing to process".
    #[serde(default)]
    pub alerts: Vec<SubAlert>,
}

/// One member alert within an inbound payload. The first member is the
/// primary and supplies the identity labels for the whole group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAlert {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub annotations: HashMap<String, String>,

    #[serde(default, rename = "startsAt")]
    pub starts_at: Option<String>,

    #[serde(default, rename = "endsAt")]
    pub ends_at: Option<String>,
}

// ============================================================================
// API request/response types
// ============================================================================

/// Query parameters for GET /api/alerts.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Maximum number of alerts to return (default: 50). Always bounded; the
    /// store refuses unbounded scans.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Filter by severity name.
    pub severity: Option<String>,

    /// Filter by lifecycle status name.
    pub status: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Response for POST /webhook/alert.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub message: String,

    /// Identity of the stored alert; absent when the payload had nothing to
    /// process.
    pub alert_id: Option<String>,

    pub signature: Option<String>,

    /// An already-open ticket for this signature, if any. The dispatch
    /// layer is expected to skip ticket creation when this is present.
    pub existing_ticket: Option<TicketLink>,
}

/// Response for GET /api/alerts.
#[derive(Debug, Clone, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<Alert>,
    pub count: usize,
}

/// Response for GET /api/alerts/{alert_id}: the record plus its full audit
/// trail, newest entries first.
#[derive(Debug, Clone, Serialize)]
pub struct AlertDetailResponse {
    pub alert: Alert,
    pub history: Vec<HistoryEntry>,
}

/// Request body for PUT /api/alerts/{alert_id}/status.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,

    /// Merged into the alert's side metadata on a successful transition.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Response for PUT /api/alerts/{alert_id}/status.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateStatusResponse {
    pub alert_id: String,
    pub status: AlertStatus,
}

/// Request body for POST /api/alerts/{alert_id}/ticket.
#[derive(Debug, Deserialize)]
pub struct LinkTicketRequest {
    pub ticket_key: String,
    #[serde(default)]
    pub ticket_url: Option<String>,
}

/// Response for POST /api/alerts/{alert_id}/ticket.
#[derive(Debug, Clone, Serialize)]
pub struct LinkTicketResponse {
    pub alert_id: String,
    pub ticket_key: String,
}

/// Response for GET /health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database_connected: bool,
}
