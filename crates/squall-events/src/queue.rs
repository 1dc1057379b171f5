//! The pending notification queue.
//!
//! Every outgoing notification first attempts to merge against the tail of
//! the not-yet-delivered queue before being appended, so downstream
//! consumers see a minimal, consistent sequence.

use std::collections::VecDeque;

use crate::notification::{MergeOutcome, Notification, merge};

/// Queue of notifications awaiting delivery.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: VecDeque<Notification>,
}

impl NotificationQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Post a notification, merging it against the queue tail first.
    pub fn post(&mut self, notification: Notification) {
        let Some(tail) = self.pending.back() else {
            self.pending.push_back(notification);
            return;
        };

        match merge(tail, &notification) {
            MergeOutcome::Failure => self.pending.push_back(notification),
            MergeOutcome::SubjectCancelled(replacement)
            | MergeOutcome::ObjectCancelled(replacement) => {
                self.pending.pop_back();
                self.pending.push_back(replacement);
            }
            MergeOutcome::MutualCancellation => {
                self.pending.pop_back();
            }
            MergeOutcome::BothReplaced(first, second) => {
                self.pending.pop_back();
                self.pending.push_back(first);
                self.pending.push_back(second);
            }
        }
    }

    /// Remove and return every pending notification, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.pending.drain(..).collect()
    }

    /// Number of pending notifications.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterate over the pending notifications without delivering them.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.pending.iter()
    }
}
