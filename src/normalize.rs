//! Canonical alert normalization.
//!
//! Monitoring sources post loosely-structured groups of alerts; this module
//! turns one such group into exactly one [`AlertDraft`] with a deterministic
//! shape, or `None` when the group has no member alerts ("nothing to
//! process" — a normal outcome, not an error).
//!
//! Missing identity labels never fail normalization. A fault report with a
//! missing `alertname`, `instance`, or `severity` still describes a real
//! condition somewhere, so the gaps are filled with the literal `"unknown"`
//! and the record is kept.

use serde_json::Value;

use crate::model::{AlertDraft, AlertPayload, AlertStatus, Severity, UNKNOWN};

/// Label carrying the fault type.
const LABEL_CONDITION: &str = "alertname";

/// Label carrying the affected entity.
const LABEL_TARGET: &str = "instance";

/// Label carrying the reported severity.
const LABEL_SEVERITY: &str = "severity";

/// Reduce an inbound payload to one canonical alert draft.
///
/// The first member alert is the primary: its labels and annotations become
/// the draft's, and its identity labels are the draft's identity. The
/// group-level `status` decides the initial lifecycle state; only the exact
/// string `resolved` produces a resolution record, everything else is
/// treated as `firing`.
///
/// `raw` is the payload as it arrived on the wire, retained on the draft
/// verbatim for audit. Pure function; no side effects.
pub fn normalize(payload: &AlertPayload, raw: Value) -> Option<AlertDraft> {
    let primary = payload.alerts.first()?;

    let condition = primary
        .labels
        .get(LABEL_CONDITION)
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());

    let target = primary
        .labels
        .get(LABEL_TARGET)
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());

    let severity = primary
        .labels
        .get(LABEL_SEVERITY)
        .map(|s| Severity::parse_lossy(s))
        .unwrap_or(Severity::Unknown);

    let status = match payload.status.as_deref() {
        Some("resolved") => AlertStatus::Resolved,
        _ => AlertStatus::Firing,
    };

    Some(AlertDraft {
        condition,
        target,
        severity,
        status,
        labels: primary.labels.clone(),
        annotations: primary.annotations.clone(),
        raw_payload: raw,
    })
}
