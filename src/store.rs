//! SQLite persistence layer for alerts and their audit ledger.
//!
//! The store owns two tables:
//!
//! - `alerts`: one row per accepted fault occurrence, keyed by a unique
//!   `alert_id`. Rows are never deleted; retention is an external concern.
//! - `alert_history`: append-only ledger. Every successful mutation of an
//!   alert (creation, status transition, ticket link) writes exactly one
//!   entry here, inside the same transaction as the mutation itself, so a
//!   row and its ledger can never diverge.
//!
//! Lifecycle transitions use a guarded UPDATE whose predicate is derived
//! from [`AlertStatus::can_transition_to`]: the legality check and the write
//! are a single SQL statement, so two racing legal transitions on the same
//! alert serialize in the database and exactly one wins. The loser sees zero
//! affected rows and gets a `false` result, never an error.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::error::PersistenceError;
use crate::model::{Alert, AlertDraft, AlertFilter, AlertStatus, HistoryEntry, Severity, TicketRef};

/// Connection cap for on-disk databases.
const MAX_CONNECTIONS: u32 = 5;

/// Bound on waiting for a pooled connection. Expiry surfaces
/// [`PersistenceError::Timeout`] instead of hanging the caller.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on waiting for the SQLite write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Last identity stamp handed out, in epoch nanoseconds.
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Strictly monotonic epoch-nanosecond stamp for alert identities.
///
/// A wall-clock seconds stamp would collide for two occurrences of the same
/// condition on the same target within one second; nanoseconds plus a
/// monotonic bump close that window entirely.
fn monotonic_nanos(now: DateTime<Utc>) -> i64 {
    let now_ns = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut prev = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now_ns.max(prev.saturating_add(1));
        match LAST_STAMP.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => prev = observed,
        }
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct AlertStore {
    pool: SqlitePool,
}

impl AlertStore {
    /// Create a new store and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:klaxon.db"
    ///   or "sqlite::memory:")
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        // An in-memory database exists once per connection, so the pool must
        // hold exactly one; WAL only applies to on-disk databases.
        let in_memory = database_url.contains(":memory:");
        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { MAX_CONNECTIONS })
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_id TEXT NOT NULL UNIQUE,
                condition TEXT NOT NULL,
                target TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                labels TEXT NOT NULL,
                annotations TEXT NOT NULL,
                raw_payload TEXT NOT NULL,
                metadata TEXT,
                ticket_key TEXT,
                ticket_url TEXT,
                ticket_linked_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_id TEXT NOT NULL REFERENCES alerts(alert_id),
                ts INTEGER NOT NULL,
                action TEXT NOT NULL,
                snapshot TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts(severity)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_signature ON alerts(condition, target)",
            // Sparse unique index: one alert per external ticket, while
            // unlinked rows stay unconstrained.
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_ticket_key
             ON alerts(ticket_key) WHERE ticket_key IS NOT NULL",
            "CREATE INDEX IF NOT EXISTS idx_history_alert_ts ON alert_history(alert_id, ts)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Cheap reachability probe for health reporting.
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Persist a normalized draft as a new alert and return its identity.
    ///
    /// The row insert and its `created` ledger entry commit as one unit: on
    /// any error nothing is written, so a caller that sees
    /// [`PersistenceError`] must assume the alert was not recorded and
    /// retry or fail upward.
    pub async fn store(&self, draft: &AlertDraft) -> Result<String, PersistenceError> {
        let now = Utc::now();
        let alert_id = format!(
            "{}_{}_{}",
            draft.condition,
            draft.target,
            monotonic_nanos(now)
        );
        let now_ms = now.timestamp_millis();

        let labels = serde_json::to_string(&draft.labels)?;
        let annotations = serde_json::to_string(&draft.annotations)?;
        let raw_payload = serde_json::to_string(&draft.raw_payload)?;
        let snapshot = serde_json::to_string(&serde_json::json!({
            "alert_id": alert_id,
            "condition": draft.condition,
            "target": draft.target,
            "severity": draft.severity,
            "status": draft.status,
            "labels": draft.labels,
            "annotations": draft.annotations,
        }))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO alerts
                (alert_id, condition, target, severity, status,
                 labels, annotations, raw_payload, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert_id)
        .bind(&draft.condition)
        .bind(&draft.target)
        .bind(draft.severity.as_str())
        .bind(draft.status.as_str())
        .bind(&labels)
        .bind(&annotations)
        .bind(&raw_payload)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO alert_history (alert_id, ts, action, snapshot) VALUES (?, ?, ?, ?)")
            .bind(&alert_id)
            .bind(now_ms)
            .bind("created")
            .bind(&snapshot)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(alert_id)
    }

    /// Fetch one alert by identity.
    pub async fn get(&self, alert_id: &str) -> Result<Option<Alert>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM alerts WHERE alert_id = ?")
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_alert).transpose()
    }

    /// List alerts newest-first, optionally filtered by severity and status.
    ///
    /// `limit` is mandatory; there is no unbounded scan.
    pub async fn list(
        &self,
        filter: &AlertFilter,
        limit: u32,
    ) -> Result<Vec<Alert>, PersistenceError> {
        let mut sql = String::from("SELECT * FROM alerts");
        let mut clauses: Vec<&str> = Vec::new();
        if filter.severity.is_some() {
            clauses.push("severity = ?");
        }
        if filter.status.is_some() {
            clauses.push("status = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(severity) = filter.severity {
            query = query.bind(severity.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        query = query.bind(i64::from(limit));

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_alert).collect()
    }

    /// Full audit trail for one alert, newest entries first.
    pub async fn history(&self, alert_id: &str) -> Result<Vec<HistoryEntry>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT alert_id, ts, action, snapshot FROM alert_history
             WHERE alert_id = ? ORDER BY ts DESC, id DESC",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    /// Apply a lifecycle transition if it is legal.
    ///
    /// Returns `Ok(false)` — writing nothing, not even history — when the
    /// alert is unknown or the transition is not an edge of the state
    /// machine. That is a normal outcome for racing or stale callers, not a
    /// failure. `metadata`, when given, merges into the alert's side
    /// metadata object; `labels` are never touched.
    pub async fn update_status(
        &self,
        alert_id: &str,
        new_status: AlertStatus,
        metadata: Option<&Value>,
    ) -> Result<bool, PersistenceError> {
        let priors = AlertStatus::legal_predecessors(new_status);
        if priors.is_empty() {
            // No edge leads here (e.g. back to `firing`).
            return Ok(false);
        }
        let prior_list = priors
            .iter()
            .map(|status| format!("'{}'", status.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        // Guarded update: legality check and write are one atomic statement.
        let result = match metadata {
            Some(value) => {
                let patch = serde_json::to_string(value)?;
                let sql = format!(
                    "UPDATE alerts
                     SET status = ?, metadata = json_patch(coalesce(metadata, '{{}}'), ?), updated_at = ?
                     WHERE alert_id = ? AND status IN ({prior_list})"
                );
                sqlx::query(&sql)
                    .bind(new_status.as_str())
                    .bind(&patch)
                    .bind(now_ms)
                    .bind(alert_id)
                    .execute(&mut *tx)
                    .await?
            }
            None => {
                let sql = format!(
                    "UPDATE alerts SET status = ?, updated_at = ?
                     WHERE alert_id = ? AND status IN ({prior_list})"
                );
                sqlx::query(&sql)
                    .bind(new_status.as_str())
                    .bind(now_ms)
                    .bind(alert_id)
                    .execute(&mut *tx)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let action = format!("status_changed_to_{new_status}");
        let snapshot = serde_json::to_string(&serde_json::json!({
            "status": new_status,
            "metadata": metadata,
        }))?;
        sqlx::query("INSERT INTO alert_history (alert_id, ts, action, snapshot) VALUES (?, ?, ?, ?)")
            .bind(alert_id)
            .bind(now_ms)
            .bind(&action)
            .bind(&snapshot)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }

    /// Attach an external ticket reference to an alert.
    ///
    /// Succeeds only when the alert exists and carries no ticket yet; a
    /// repeated link — from a retrying caller, or for a ticket key already
    /// attached to another alert — returns `Ok(false)` and leaves the
    /// original reference in place.
    pub async fn link_ticket(
        &self,
        alert_id: &str,
        ticket_key: &str,
        ticket_url: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let result = match sqlx::query(
            "UPDATE alerts
             SET ticket_key = ?, ticket_url = ?, ticket_linked_at = ?, updated_at = ?
             WHERE alert_id = ? AND ticket_key IS NULL",
        )
        .bind(ticket_key)
        .bind(ticket_url)
        .bind(now_ms)
        .bind(now_ms)
        .bind(alert_id)
        .execute(&mut *tx)
        .await
        {
            Ok(result) => result,
            // The sparse unique index rejects a ticket key already attached
            // to a different alert.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let snapshot = serde_json::to_string(&serde_json::json!({
            "ticket_key": ticket_key,
            "ticket_url": ticket_url,
        }))?;
        sqlx::query("INSERT INTO alert_history (alert_id, ts, action, snapshot) VALUES (?, ?, ?, ?)")
            .bind(alert_id)
            .bind(now_ms)
            .bind("ticket_linked")
            .bind(&snapshot)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }

    /// All ticket-carrying alerts for a signature, newest first. Input to
    /// the ticket correlator.
    pub async fn linked_alerts_for_signature(
        &self,
        signature: &str,
    ) -> Result<Vec<Alert>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM alerts
             WHERE condition || '_' || target = ? AND ticket_key IS NOT NULL
             ORDER BY created_at DESC, id DESC",
        )
        .bind(signature)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_alert).collect()
    }

    // ------------------------------------------------------------------
    // Count queries consumed by the stats aggregator
    // ------------------------------------------------------------------

    pub async fn count_alerts(&self) -> Result<i64, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alerts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn count_by_severity(&self) -> Result<HashMap<String, i64>, PersistenceError> {
        let rows = sqlx::query("SELECT severity, COUNT(*) AS n FROM alerts GROUP BY severity")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("severity"), row.get("n")))
            .collect())
    }

    pub async fn count_by_status(&self) -> Result<HashMap<String, i64>, PersistenceError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM alerts GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("status"), row.get("n")))
            .collect())
    }

    pub async fn count_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alerts WHERE created_at >= ?")
            .bind(since.timestamp_millis())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn count_linked_tickets(&self) -> Result<i64, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alerts WHERE ticket_key IS NOT NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn row_to_alert(row: &SqliteRow) -> Result<Alert, PersistenceError> {
    let labels: HashMap<String, String> = serde_json::from_str(&row.get::<String, _>("labels"))?;
    let annotations: HashMap<String, String> =
        serde_json::from_str(&row.get::<String, _>("annotations"))?;
    let raw_payload: Value = serde_json::from_str(&row.get::<String, _>("raw_payload"))?;
    let metadata = row
        .get::<Option<String>, _>("metadata")
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    let ticket = row.get::<Option<String>, _>("ticket_key").map(|ticket_key| {
        let linked_ms: Option<i64> = row.get("ticket_linked_at");
        TicketRef {
            ticket_key,
            ticket_url: row.get("ticket_url"),
            linked_at: millis_to_datetime(linked_ms.unwrap_or_default()),
        }
    });

    // Rows only ever hold names written through the enums, so a parse miss
    // means manual tampering; fall back rather than refuse the whole row.
    let severity = Severity::parse_lossy(&row.get::<String, _>("severity"));
    let status = row
        .get::<String, _>("status")
        .parse()
        .unwrap_or(AlertStatus::Firing);

    Ok(Alert {
        alert_id: row.get("alert_id"),
        condition: row.get("condition"),
        target: row.get("target"),
        severity,
        status,
        labels,
        annotations,
        raw_payload,
        metadata,
        ticket,
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
    })
}

fn row_to_history(row: &SqliteRow) -> Result<HistoryEntry, PersistenceError> {
    Ok(HistoryEntry {
        alert_id: row.get("alert_id"),
        ts: millis_to_datetime(row.get("ts")),
        action: row.get("action"),
        snapshot: serde_json::from_str(&row.get::<String, _>("snapshot"))?,
    })
}
