//! Typed notification bus with explicit priority ordering.
//!
//! Consumers register a handler for specific notification kinds together
//! with an integer priority. Dispatch walks subscribers in ascending
//! (priority, registration order), so a lower number runs earlier and ties
//! resolve to first-registered-first. There is no reflective dispatch: a
//! subscriber sees exactly the kinds it asked for.

use std::collections::BTreeSet;

use tracing::trace;

use crate::notification::{Notification, NotificationKind};

/// Handle returned from [`NotificationBus::subscribe`], used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberToken(u64);

/// Dispatch priority; lower values run earlier.
pub type Priority = i32;

struct Subscriber {
    token: SubscriberToken,
    priority: Priority,
    kinds: BTreeSet<NotificationKind>,
    handler: Box<dyn FnMut(&Notification) + Send>,
}

/// Priority-ordered dispatcher from notifications to registered handlers.
#[derive(Default)]
pub struct NotificationBus {
    // Kept sorted by (priority, token); tokens increase monotonically, so
    // equal priorities dispatch in registration order.
    subscribers: Vec<Subscriber>,
    next_token: u64,
}

impl core::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl NotificationBus {
    /// Create a bus with no subscribers.
    pub const fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_token: 0,
        }
    }

    /// Register a handler for the given notification kinds.
    pub fn subscribe(
        &mut self,
        priority: Priority,
        kinds: BTreeSet<NotificationKind>,
        handler: Box<dyn FnMut(&Notification) + Send>,
    ) -> SubscriberToken {
        let token = SubscriberToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        let subscriber = Subscriber {
            token,
            priority,
            kinds,
            handler,
        };
        let position = self
            .subscribers
            .partition_point(|existing| (existing.priority, existing.token) <= (priority, token));
        self.subscribers.insert(position, subscriber);
        token
    }

    /// Detach a subscriber. Returns whether the token was known.
    pub fn unsubscribe(&mut self, token: SubscriberToken) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|existing| existing.token != token);
        self.subscribers.len() != before
    }

    /// Dispatch one notification to every subscriber registered for its
    /// kind, in priority order.
    pub fn publish(&mut self, notification: &Notification) {
        let kind = notification.kind();
        trace!(?kind, "dispatching notification");
        for subscriber in &mut self.subscribers {
            if subscriber.kinds.contains(&kind) {
                (subscriber.handler)(notification);
            }
        }
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
