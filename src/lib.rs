//! Klaxon - a durable alert ingestion, deduplication, and ticket-correlation
//! engine.
//!
//! # Overview
//!
//! Klaxon turns transient, possibly repeating, fault notifications from a
//! monitoring source into durable records with a tracked lifecycle, an
//! append-only audit ledger, and an at-most-one-open-ticket guarantee per
//! fault signature. Each accepted ingestion becomes its own alert record;
//! repeated occurrences of one underlying condition are correlated through
//! their shared signature (`condition + "_" + target`) rather than merged.
//!
//! Duplicate suppression works at both ends of the pipeline:
//!
//! - [`cooldown`] stops the generation side from emitting the same condition
//!   again before its cooldown has elapsed.
//! - [`correlate`] stops the dispatch side from opening a second external
//!   ticket while one is still open for the signature.
//!
//! # Modules
//!
//! - [`model`]: canonical alert types, lifecycle state machine, payloads
//! - [`normalize`]: raw webhook payload -> one canonical alert draft
//! - [`store`]: SQLite persistence, transitions, and the history ledger
//! - [`correlate`]: open-ticket lookup by fault signature
//! - [`cooldown`]: in-memory re-notification suppression
//! - [`stats`]: read-side aggregate counts
//! - [`error`]: persistence error taxonomy
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod cooldown;
pub mod correlate;
pub mod error;
pub mod model;
pub mod normalize;
pub mod stats;
pub mod store;
