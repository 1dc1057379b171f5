//! Change notifications and the pairwise merge algebra.
//!
//! A [`Notification`] is the unit handed to downstream consumers (displays,
//! persistence, conflict recompute). Before delivery, notifications sit in
//! a pending queue where each new one first tries to merge with the queue
//! tail; the possible outcomes are the [`MergeOutcome`] variants.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use squall_types::{ConflictMap, EventId, Originator};

use crate::modification::{Modification, merge_modification_lists};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One change notification bound for downstream consumers.
///
/// Per-event notifications are mergeable only with notifications for the
/// same originator and event; set-level notifications merge per originator
/// and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// Fields of one managed event changed.
    EventModified {
        /// Actor attributed with the change.
        originator: Originator,
        /// The event that changed.
        event_id: EventId,
        /// The net field-level changes, in application order.
        modifications: Vec<Modification>,
    },
    /// Events entered the session collection.
    EventsAdded {
        /// Actor attributed with the change.
        originator: Originator,
        /// Identifiers of the added events.
        event_ids: BTreeSet<EventId>,
    },
    /// Events left the session collection.
    EventsRemoved {
        /// Actor attributed with the change.
        originator: Originator,
        /// Identifiers of the removed events.
        event_ids: BTreeSet<EventId>,
    },
    /// The in-memory ordering of the collection changed.
    OrderingChanged {
        /// Actor attributed with the change.
        originator: Originator,
    },
    /// The conflict map for the selected events was recomputed and differs
    /// from the previous one.
    SelectedConflictsChanged {
        /// Actor attributed with the change that triggered recomputation.
        originator: Originator,
        /// The new conflict map.
        conflicts: ConflictMap,
    },
}

/// Discriminant of a [`Notification`], used for bus registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// [`Notification::EventModified`].
    EventModified,
    /// [`Notification::EventsAdded`].
    EventsAdded,
    /// [`Notification::EventsRemoved`].
    EventsRemoved,
    /// [`Notification::OrderingChanged`].
    OrderingChanged,
    /// [`Notification::SelectedConflictsChanged`].
    SelectedConflictsChanged,
}

impl Notification {
    /// The discriminant of this notification.
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::EventModified { .. } => NotificationKind::EventModified,
            Self::EventsAdded { .. } => NotificationKind::EventsAdded,
            Self::EventsRemoved { .. } => NotificationKind::EventsRemoved,
            Self::OrderingChanged { .. } => NotificationKind::OrderingChanged,
            Self::SelectedConflictsChanged { .. } => NotificationKind::SelectedConflictsChanged,
        }
    }

    /// The actor attributed with this notification.
    pub const fn originator(&self) -> Originator {
        match self {
            Self::EventModified { originator, .. }
            | Self::EventsAdded { originator, .. }
            | Self::EventsRemoved { originator, .. }
            | Self::OrderingChanged { originator }
            | Self::SelectedConflictsChanged { originator, .. } => *originator,
        }
    }
}

// ---------------------------------------------------------------------------
// Merge algebra
// ---------------------------------------------------------------------------

/// Outcome of merging an already-queued notification (the "original")
/// against a newly produced one.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Not mergeable; both notifications are kept.
    Failure,
    /// The original is replaced entirely by the carried notification.
    SubjectCancelled(Notification),
    /// The new notification is absorbed; the original survives in the
    /// carried, updated form.
    ObjectCancelled(Notification),
    /// Both notifications vanish.
    MutualCancellation,
    /// Original and new are replaced by two new, disjoint notifications.
    BothReplaced(Notification, Notification),
}

/// Merge an already-queued notification against a newly produced one.
///
/// Written as an exhaustive match over notification pairs so the compiler
/// flags any new variant lacking a merge rule. A [`MergeOutcome::Failure`]
/// is not an error; it means both notifications are delivered.
#[allow(clippy::too_many_lines)]
pub fn merge(original: &Notification, incoming: &Notification) -> MergeOutcome {
    if original.originator() != incoming.originator() {
        return MergeOutcome::Failure;
    }

    match (original, incoming) {
        (
            Notification::EventModified {
                originator,
                event_id,
                modifications: existing,
            },
            Notification::EventModified {
                event_id: incoming_id,
                modifications: addition,
                ..
            },
        ) => {
            if event_id != incoming_id {
                return MergeOutcome::Failure;
            }
            let merged = merge_modification_lists(existing.clone(), addition.clone());
            if merged.is_empty() {
                // Every field-level change cancelled out; an empty
                // modification notification carries no information.
                MergeOutcome::MutualCancellation
            } else {
                MergeOutcome::ObjectCancelled(Notification::EventModified {
                    originator: *originator,
                    event_id: event_id.clone(),
                    modifications: merged,
                })
            }
        }

        (
            Notification::EventModified { event_id, .. },
            Notification::EventsRemoved { event_ids, .. },
        ) => {
            // A removal makes any pending modification of the same event
            // moot; the removal takes the original's place in the queue.
            if event_ids.contains(event_id) {
                MergeOutcome::SubjectCancelled(incoming.clone())
            } else {
                MergeOutcome::Failure
            }
        }

        (
            Notification::EventsAdded {
                originator,
                event_ids: added,
            },
            Notification::EventsRemoved {
                event_ids: removed, ..
            },
        ) => merge_added_against_removed(*originator, added, removed),

        (
            Notification::EventsAdded {
                originator,
                event_ids: existing,
            },
            Notification::EventsAdded {
                event_ids: addition,
                ..
            },
        ) => MergeOutcome::ObjectCancelled(Notification::EventsAdded {
            originator: *originator,
            event_ids: existing.union(addition).cloned().collect(),
        }),

        (
            Notification::EventsRemoved {
                originator,
                event_ids: existing,
            },
            Notification::EventsRemoved {
                event_ids: addition,
                ..
            },
        ) => MergeOutcome::ObjectCancelled(Notification::EventsRemoved {
            originator: *originator,
            event_ids: existing.union(addition).cloned().collect(),
        }),

        (Notification::OrderingChanged { .. }, Notification::OrderingChanged { .. }) => {
            // Two reorderings back-to-back collapse into one signal.
            MergeOutcome::ObjectCancelled(original.clone())
        }

        (
            Notification::SelectedConflictsChanged { .. },
            Notification::SelectedConflictsChanged { .. },
        ) => {
            // Only the latest conflict map matters.
            MergeOutcome::ObjectCancelled(incoming.clone())
        }

        (
            Notification::EventModified { .. }
            | Notification::EventsAdded { .. }
            | Notification::EventsRemoved { .. }
            | Notification::OrderingChanged { .. }
            | Notification::SelectedConflictsChanged { .. },
            _,
        ) => MergeOutcome::Failure,
    }
}

/// Merge an "added" set against a later "removed" set of the same
/// originator.
fn merge_added_against_removed(
    originator: Originator,
    added: &BTreeSet<EventId>,
    removed: &BTreeSet<EventId>,
) -> MergeOutcome {
    if added.is_disjoint(removed) {
        return MergeOutcome::Failure;
    }

    let remaining_added: BTreeSet<EventId> = added.difference(removed).cloned().collect();
    let remaining_removed: BTreeSet<EventId> = removed.difference(added).cloned().collect();

    match (remaining_added.is_empty(), remaining_removed.is_empty()) {
        // Identical sets: an add immediately undone by a remove.
        (true, true) => MergeOutcome::MutualCancellation,
        // The add was fully undone but other events were also removed.
        (true, false) => MergeOutcome::SubjectCancelled(Notification::EventsRemoved {
            originator,
            event_ids: remaining_removed,
        }),
        // The removal only affected just-added events.
        (false, true) => MergeOutcome::ObjectCancelled(Notification::EventsAdded {
            originator,
            event_ids: remaining_added,
        }),
        // Partial overlap: the intersection cancels, two smaller
        // notifications remain.
        (false, false) => MergeOutcome::BothReplaced(
            Notification::EventsAdded {
                originator,
                event_ids: remaining_added,
            },
            Notification::EventsRemoved {
                originator,
                event_ids: remaining_removed,
            },
        ),
    }
}
