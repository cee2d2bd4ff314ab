//! Read-side rollups over the alert store.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::PersistenceError;
use crate::store::AlertStore;

/// Lookback for the recent-activity count.
const RECENT_WINDOW_HOURS: i64 = 24;

/// Aggregate counts for GET /api/stats.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total_alerts: i64,

    /// Alert counts keyed by severity name.
    pub by_severity: HashMap<String, i64>,

    /// Alert counts keyed by lifecycle status name.
    pub by_status: HashMap<String, i64>,

    /// Alerts created within the last 24 hours.
    pub recent_24h: i64,

    /// Alerts carrying an external ticket reference.
    pub linked_tickets: i64,
}

/// Compute the current rollups.
///
/// Pure read-side aggregation; an empty store yields zeros and empty maps,
/// never an error.
pub async fn summary(
    store: &AlertStore,
    now: DateTime<Utc>,
) -> Result<StatsSummary, PersistenceError> {
    let total_alerts = store.count_alerts().await?;
    let by_severity = store.count_by_severity().await?;
    let by_status = store.count_by_status().await?;
    let recent_24h = store
        .count_created_since(now - Duration::hours(RECENT_WINDOW_HOURS))
        .await?;
    let linked_tickets = store.count_linked_tickets().await?;

    Ok(StatsSummary {
        total_alerts,
        by_severity,
        by_status,
        recent_24h,
        linked_tickets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertDraft, AlertStatus, Severity};
    use serde_json::json;
    use std::collections::HashMap;

    async fn setup_store() -> AlertStore {
        AlertStore::new("sqlite::memory:").await.unwrap()
    }

    fn draft(condition: &str, target: &str, severity: Severity) -> AlertDraft {
        AlertDraft {
            condition: condition.to_string(),
            target: target.to_string(),
            severity,
            status: AlertStatus::Firing,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            raw_payload: json!({}),
        }
    }

    #[tokio::test]
    async fn test_summary_of_empty_store_is_all_zeros() {
        let store = setup_store().await;

        let stats = summary(&store, Utc::now()).await.unwrap();

        assert_eq!(stats.total_alerts, 0);
        assert!(stats.by_severity.is_empty());
        assert!(stats.by_status.is_empty());
        assert_eq!(stats.recent_24h, 0);
        assert_eq!(stats.linked_tickets, 0);
    }

    #[tokio::test]
    async fn test_summary_counts_by_severity_and_status() {
        let store = setup_store().await;
        store
            .store(&draft("DiskFull", "host-1", Severity::Critical))
            .await
            .unwrap();
        store
            .store(&draft("DiskFull", "host-2", Severity::Critical))
            .await
            .unwrap();
        let resolved = store
            .store(&draft("HighIoWait", "host-3", Severity::Warning))
            .await
            .unwrap();
        store
            .update_status(&resolved, AlertStatus::Resolved, None)
            .await
            .unwrap();

        let stats = summary(&store, Utc::now()).await.unwrap();

        assert_eq!(stats.total_alerts, 3);
        assert_eq!(stats.by_severity.get("critical"), Some(&2));
        assert_eq!(stats.by_severity.get("warning"), Some(&1));
        assert_eq!(stats.by_status.get("firing"), Some(&2));
        assert_eq!(stats.by_status.get("resolved"), Some(&1));
        assert_eq!(stats.recent_24h, 3);
    }

    #[tokio::test]
    async fn test_summary_counts_linked_tickets() {
        let store = setup_store().await;
        let alert_id = store
            .store(&draft("DiskFull", "host-1", Severity::Critical))
            .await
            .unwrap();
        store
            .store(&draft("DiskFull", "host-2", Severity::Critical))
            .await
            .unwrap();
        store.link_ticket(&alert_id, "OPS-1", None).await.unwrap();

        let stats = summary(&store, Utc::now()).await.unwrap();

        assert_eq!(stats.linked_tickets, 1);
    }

    #[tokio::test]
    async fn test_recent_window_excludes_old_reference_point() {
        let store = setup_store().await;
        store
            .store(&draft("DiskFull", "host-1", Severity::Critical))
            .await
            .unwrap();

        // From the vantage point of two days later the alert is stale.
        let later = Utc::now() + Duration::hours(48);
        let stats = summary(&store, later).await.unwrap();

        assert_eq!(stats.total_alerts, 1);
        assert_eq!(stats.recent_24h, 0);
    }
}
