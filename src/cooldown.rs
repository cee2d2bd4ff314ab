//! Cooldown-based notification suppression for the alert-generation side.
//!
//! Monitoring checks run on an interval, so a breached threshold would emit
//! an identical alert every cycle. The tracker remembers when each
//! generation key (condition + instance + severity) last fired and refuses a
//! re-fire until the cooldown has elapsed.
//!
//! State is in-memory only and lost on restart. That is deliberate: the
//! worst case after a restart is one extra duplicate notification, which is
//! a better trade than dragging persistence into the generation hot path.
//! The store-side ticket correlator independently prevents duplicate
//! external tickets, so the two mechanisms cover source and sink.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Cooldown applied when a caller has no specific requirement.
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 15;

/// Tracks the last fire time per generation key.
///
/// All operations are O(1) map lookups behind one mutex; contention is
/// negligible at generation-cycle frequencies. Key cardinality is one per
/// condition × instance × severity tuple, small enough that entries are
/// never evicted.
pub struct CooldownTracker {
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether `key` may fire at `now`.
    ///
    /// The first sighting of a key always fires. After that a key fires only
    /// when more than `cooldown` has elapsed since its last fire. A `true`
    /// result records `now` as the new last fire time; a `false` result
    /// mutates nothing, so a suppressed burst does not push the window out.
    pub fn should_fire(&self, key: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let mut last_fired = self
            .last_fired
            .lock()
            .expect("cooldown state lock poisoned");

        match last_fired.get(key) {
            Some(&last) if now - last <= cooldown => false,
            _ => {
                last_fired.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Number of distinct keys ever seen.
    pub fn tracked_keys(&self) -> usize {
        self.last_fired
            .lock()
            .expect("cooldown state lock poisoned")
            .len()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}
