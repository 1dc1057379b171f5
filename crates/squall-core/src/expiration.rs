//! Expiration scheduling against the session clock.
//!
//! Each issued event carries at most one pending wake at the minute floor
//! of its end time. The scheduler is a passive table: the session asks it
//! which wakes are due at the current simulated instant and ends those
//! events itself. Events ending "until further notice" are never armed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use squall_types::{minute_floor, EventId, TimeRange};
use tracing::debug;

/// Table of pending expiration wakes, one per issued event.
#[derive(Debug, Default)]
pub struct ExpirationScheduler {
    wakes: BTreeMap<EventId, DateTime<Utc>>,
}

impl ExpirationScheduler {
    /// Create a scheduler with no pending wakes.
    pub const fn new() -> Self {
        Self {
            wakes: BTreeMap::new(),
        }
    }

    /// Arm (or re-arm) the wake for an event, truncated to the minute
    /// floor of its end time. An until-further-notice range disarms the
    /// event instead.
    pub fn schedule(&mut self, event_id: &EventId, range: &TimeRange) {
        if range.has_until_further_notice() {
            self.cancel(event_id);
            return;
        }
        let wake = minute_floor(range.end);
        debug!(event_id = %event_id, wake = %wake, "armed expiration wake");
        self.wakes.insert(event_id.clone(), wake);
    }

    /// Disarm the wake for an event, if one is pending.
    pub fn cancel(&mut self, event_id: &EventId) {
        if self.wakes.remove(event_id).is_some() {
            debug!(event_id = %event_id, "cancelled expiration wake");
        }
    }

    /// Disarm every pending wake.
    pub fn cancel_all(&mut self) {
        self.wakes.clear();
    }

    /// Whether an event has a pending wake.
    pub fn is_armed(&self, event_id: &EventId) -> bool {
        self.wakes.contains_key(event_id)
    }

    /// The earliest pending wake instant, if any.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.wakes.values().min().copied()
    }

    /// Number of pending wakes.
    pub fn len(&self) -> usize {
        self.wakes.len()
    }

    /// Whether no wake is pending.
    pub fn is_empty(&self) -> bool {
        self.wakes.is_empty()
    }

    /// Remove and return the events whose wakes are due at `now`, in
    /// identifier order.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<EventId> {
        let due: Vec<EventId> = self
            .wakes
            .iter()
            .filter(|(_id, wake)| **wake <= now)
            .map(|(id, _wake)| id.clone())
            .collect();
        for id in &due {
            self.wakes.remove(id);
        }
        due
    }
}
