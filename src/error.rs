//! Error taxonomy for the alert store.
//!
//! Only genuine persistence failures become errors. Expected outcomes of
//! racing or stale callers (an illegal lifecycle transition, a repeated
//! ticket link) are `Ok(false)` results on the store operations instead, so
//! the hot path stays allocation-free and callers never have to catch an
//! exception to handle a normal case. An inbound payload with nothing to
//! process is `None` from the normalizer, not an error at all.

use thiserror::Error;

/// Failure to durably read or write alert state.
///
/// Always propagated to the caller: an alert that is acknowledged as
/// received but not durably stored is the one failure mode this crate must
/// never hide, so the ingestion layer needs to see these and answer its own
/// caller with a retryable error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The underlying database rejected the operation or is unreachable.
    #[error("alert storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// A connection could not be acquired, or a write lock was not granted,
    /// within the configured bound. Surfaced instead of hanging the caller.
    #[error("alert storage operation timed out")]
    Timeout,

    /// A record could not be serialized to or parsed from its stored form.
    #[error("failed to encode alert record: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => PersistenceError::Timeout,
            // SQLite reports an expired busy_timeout as a locked database.
            sqlx::Error::Database(db) if db.message().contains("database is locked") => {
                PersistenceError::Timeout
            }
            other => PersistenceError::Unavailable(other),
        }
    }
}
