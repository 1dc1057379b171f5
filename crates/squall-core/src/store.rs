//! The persistence-store collaborator interface.
//!
//! The session never talks to a storage engine directly: it consumes the
//! [`EventStore`] trait and treats each event's persisted form as a history
//! list (one snapshot per issuance). The in-memory [`MemoryStore`] backs
//! tests and the demo binary.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use squall_types::{EventId, SiteId, Status};

use crate::record::EventRecord;

/// Errors surfaced by a persistence store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store backend rejected or failed the operation.
    #[error("store backend failure: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },

    /// The requested event has no history in the store.
    #[error("no stored history for event {0}")]
    UnknownEvent(EventId),
}

/// Filter for bulk history queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFilter {
    /// Restrict to these sites; `None` means any site.
    pub sites: Option<BTreeSet<SiteId>>,
    /// Restrict to events whose latest snapshot has one of these statuses;
    /// `None` means any status.
    pub statuses: Option<BTreeSet<Status>>,
    /// Restrict to these phenomenon codes; `None` means any phenomenon.
    pub phenomena: Option<BTreeSet<String>>,
}

impl StoreFilter {
    /// Whether the latest snapshot of a history passes this filter.
    fn matches(&self, latest: &EventRecord) -> bool {
        let site_ok = self
            .sites
            .as_ref()
            .is_none_or(|sites| sites.contains(latest.site_id()));
        let status_ok = self
            .statuses
            .as_ref()
            .is_none_or(|statuses| statuses.contains(&latest.status()));
        let phenomenon_ok = self.phenomena.as_ref().is_none_or(|phenomena| {
            latest
                .hazard_type()
                .is_some_and(|ty| phenomena.contains(&ty.phenomenon))
        });
        site_ok && status_ok && phenomenon_ok
    }
}

/// One event's persisted history, oldest snapshot first.
pub type HistoryList = Vec<EventRecord>;

/// The persistence-store collaborator.
pub trait EventStore: Send + Sync {
    /// Fetch the histories of all events matching the filter.
    fn events_by_filter(
        &self,
        filter: &StoreFilter,
    ) -> Result<BTreeMap<EventId, HistoryList>, StoreError>;

    /// Fetch one event's history.
    fn by_event_id(&self, event_id: &EventId) -> Result<HistoryList, StoreError>;

    /// Create the first snapshot of a new event.
    fn create_event(&self, event: &EventRecord) -> Result<(), StoreError>;

    /// Append a snapshot to an event's history.
    fn store_event(&self, event: &EventRecord) -> Result<(), StoreError>;

    /// Remove the given history (all snapshots of one event) from the
    /// store.
    fn remove_events(&self, history: &HistoryList) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory [`EventStore`] used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    histories: Mutex<BTreeMap<EventId, HistoryList>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events with at least one snapshot.
    pub fn event_count(&self) -> usize {
        self.histories.lock().map(|map| map.len()).unwrap_or(0)
    }

    fn locked(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<EventId, HistoryList>>, StoreError> {
        self.histories.lock().map_err(|_poisoned| StoreError::Backend {
            reason: "memory store mutex poisoned".to_owned(),
        })
    }
}

impl EventStore for MemoryStore {
    fn events_by_filter(
        &self,
        filter: &StoreFilter,
    ) -> Result<BTreeMap<EventId, HistoryList>, StoreError> {
        let histories = self.locked()?;
        Ok(histories
            .iter()
            .filter(|(_id, history)| history.last().is_some_and(|latest| filter.matches(latest)))
            .map(|(id, history)| (id.clone(), history.clone()))
            .collect())
    }

    fn by_event_id(&self, event_id: &EventId) -> Result<HistoryList, StoreError> {
        let histories = self.locked()?;
        histories
            .get(event_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEvent(event_id.clone()))
    }

    fn create_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let mut histories = self.locked()?;
        histories
            .entry(event.event_id().clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn store_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        self.create_event(event)
    }

    fn remove_events(&self, history: &HistoryList) -> Result<(), StoreError> {
        let mut histories = self.locked()?;
        for snapshot in history {
            histories.remove(snapshot.event_id());
        }
        Ok(())
    }
}

/// A store that fails every write; used to exercise the catch-and-log
/// persistence path in tests.
#[derive(Debug, Default)]
pub struct FailingStore;

impl EventStore for FailingStore {
    fn events_by_filter(
        &self,
        _filter: &StoreFilter,
    ) -> Result<BTreeMap<EventId, HistoryList>, StoreError> {
        Err(StoreError::Backend {
            reason: "store offline".to_owned(),
        })
    }

    fn by_event_id(&self, event_id: &EventId) -> Result<HistoryList, StoreError> {
        Err(StoreError::UnknownEvent(event_id.clone()))
    }

    fn create_event(&self, _event: &EventRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend {
            reason: "store offline".to_owned(),
        })
    }

    fn store_event(&self, _event: &EventRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend {
            reason: "store offline".to_owned(),
        })
    }

    fn remove_events(&self, _history: &HistoryList) -> Result<(), StoreError> {
        Err(StoreError::Backend {
            reason: "store offline".to_owned(),
        })
    }
}
