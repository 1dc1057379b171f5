//! The session manager: lifecycle orchestration over the event collection.
//!
//! The manager owns the in-memory event collection and routes every
//! operation through the record guards, the notification queue, the
//! conflict detector, and the expiration scheduler. Collaborators (clock,
//! store, hatch resolver, id generator, warning channel) are injected as
//! trait objects at construction.
//!
//! Clock discontinuities are latched by a listener into a dirty flag and
//! handled on the next [`SessionManager::tick`]; the embedding application
//! pumps `tick` from its event loop.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;
use squall_events::{
    Notification, NotificationBus, NotificationKind, NotificationQueue, Priority, SubscriberToken,
};
use squall_types::{
    ATTR_SELECTED, AttributeMap, ConflictMap, EventGeometry, EventId, HazardType, Originator,
    PROTECTED_ATTRIBUTES, Status, TimeRange, minute_floor,
};
use tracing::{debug, info, warn};

use crate::alert::AlertChannel;
use crate::clock::{ListenerToken, SessionClock};
use crate::config::{HazardTypeConfig, SessionConfig};
use crate::conflict::ConflictDetector;
use crate::error::SessionError;
use crate::expiration::ExpirationScheduler;
use crate::hatch::HatchResolver;
use crate::ident::IdGenerator;
use crate::record::{DraftEvent, EventRecord, RecordParams, RecordSource};
use crate::store::{EventStore, StoreFilter};

/// Attribute holding the category stamped onto new events.
const ATTR_CATEGORY: &str = "category";

/// Attribute stashing the bounded end time while an event runs until
/// further notice, so disabling the sentinel can restore it.
const ATTR_PRIOR_END: &str = "priorEndTime";

/// Outcome of a requested status transition.
///
/// An illegal edge is not an error: the request is ignored and the event
/// keeps its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was legal and applied.
    Applied,
    /// The transition was illegal (or pointless) and ignored.
    Ignored,
}

impl TransitionOutcome {
    /// Whether the transition was applied.
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Construction parameters for [`SessionManager`].
pub struct SessionParams {
    /// Complete session configuration.
    pub config: SessionConfig,
    /// The session's notion of "now".
    pub clock: Arc<dyn SessionClock>,
    /// Persistence backend.
    pub store: Arc<dyn EventStore>,
    /// Hatched-area builder.
    pub resolver: Arc<dyn HatchResolver>,
    /// Public-identifier allocator.
    pub ids: Arc<dyn IdGenerator>,
    /// User-facing warning channel.
    pub alerts: Arc<dyn AlertChannel>,
}

/// Orchestrator of the hazard-event collection for one session.
pub struct SessionManager {
    config: SessionConfig,
    clock: Arc<dyn SessionClock>,
    store: Arc<dyn EventStore>,
    resolver: Arc<dyn HatchResolver>,
    ids: Arc<dyn IdGenerator>,
    alerts: Arc<dyn AlertChannel>,
    events: Vec<EventRecord>,
    queue: NotificationQueue,
    bus: NotificationBus,
    detector: ConflictDetector,
    scheduler: ExpirationScheduler,
    clock_listener: Option<ListenerToken>,
    clock_dirty: Arc<AtomicBool>,
    last_modified: Option<EventId>,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("site_id", &self.config.site_id)
            .field("events", &self.events.len())
            .field("pending_notifications", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build a session over the given collaborators and register for clock
    /// discontinuities.
    pub fn new(params: SessionParams) -> Self {
        let clock_dirty = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&clock_dirty);
        let clock_listener = Some(
            params
                .clock
                .register_change_listener(Box::new(move || {
                    flag.store(true, Ordering::SeqCst);
                })),
        );
        info!(site_id = %params.config.site_id, "session started");
        Self {
            config: params.config,
            clock: params.clock,
            store: params.store,
            resolver: params.resolver,
            ids: params.ids,
            alerts: params.alerts,
            events: Vec::new(),
            queue: NotificationQueue::new(),
            bus: NotificationBus::new(),
            detector: ConflictDetector::new(),
            scheduler: ExpirationScheduler::new(),
            clock_listener,
            clock_dirty,
            last_modified: None,
        }
    }

    // -- accessors ---------------------------------------------------------

    /// The session configuration.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// All managed events, in collection order.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// The managed event with the given public identifier.
    pub fn event(&self, event_id: &EventId) -> Option<&EventRecord> {
        self.events.iter().find(|event| event.event_id() == event_id)
    }

    /// The currently selected events, in collection order.
    pub fn selected_events(&self) -> Vec<&EventRecord> {
        self.events.iter().filter(|event| event.is_selected()).collect()
    }

    /// The currently checked events, in collection order.
    pub fn checked_events(&self) -> Vec<&EventRecord> {
        self.events.iter().filter(|event| event.is_checked()).collect()
    }

    /// The events with the given status, in collection order.
    pub fn events_by_status(&self, status: Status) -> Vec<&EventRecord> {
        self.events
            .iter()
            .filter(|event| event.status() == status)
            .collect()
    }

    /// The most recently modified event, when one is tracked.
    pub fn last_modified_event(&self) -> Option<&EventRecord> {
        self.last_modified
            .as_ref()
            .and_then(|event_id| self.event(event_id))
    }

    /// Track an event as the most recently modified one.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier.
    pub fn set_last_modified(&mut self, event_id: &EventId) -> Result<(), SessionError> {
        self.position(event_id)?;
        self.last_modified = Some(event_id.clone());
        Ok(())
    }

    /// The events passing the active display-filter settings.
    pub fn events_for_settings(&self) -> Vec<&EventRecord> {
        self.events
            .iter()
            .filter(|event| {
                self.config.settings.passes(
                    event.site_id(),
                    event.type_key().as_deref(),
                    event.status(),
                )
            })
            .collect()
    }

    /// The conflict map from the last recomputation (selected events
    /// against all non-ended candidates).
    pub const fn conflicts(&self) -> &ConflictMap {
        self.detector.current()
    }

    /// Compute the conflict map over all non-ended events, uncached.
    ///
    /// # Errors
    ///
    /// Propagates hatch failures from the hatched-area collaborator.
    pub fn all_conflicts(&self) -> Result<ConflictMap, SessionError> {
        let candidates: Vec<&EventRecord> = self
            .events
            .iter()
            .filter(|event| event.status() != Status::Ended)
            .collect();
        Ok(ConflictDetector::compute(
            &candidates,
            &candidates,
            &self.config.hazard_types,
            self.resolver.as_ref(),
            self.alerts.as_ref(),
        )?)
    }

    /// Number of queued, undelivered notifications.
    pub fn pending_notification_count(&self) -> usize {
        self.queue.len()
    }

    // -- bus ---------------------------------------------------------------

    /// Register a notification handler for the given kinds.
    pub fn subscribe(
        &mut self,
        priority: Priority,
        kinds: BTreeSet<NotificationKind>,
        handler: Box<dyn FnMut(&Notification) + Send>,
    ) -> SubscriberToken {
        self.bus.subscribe(priority, kinds, handler)
    }

    /// Detach a notification handler. Returns whether the token was known.
    pub fn unsubscribe(&mut self, token: SubscriberToken) -> bool {
        self.bus.unsubscribe(token)
    }

    /// Deliver every queued notification through the bus, in order.
    pub fn flush_notifications(&mut self) {
        for notification in self.queue.drain() {
            self.bus.publish(&notification);
        }
    }

    // -- adding and loading ------------------------------------------------

    /// Add a new event to the session from a draft.
    ///
    /// Missing fields default from the configuration and the clock; an
    /// absent identifier is generated before the event joins the
    /// collection. The new event becomes selected, replacing the current
    /// selection unless the settings say to extend it.
    ///
    /// # Errors
    ///
    /// [`SessionError::DuplicateEvent`] when the draft names an identifier
    /// already managed, [`SessionError::IdGeneration`] when the allocator
    /// fails (no partial event remains), plus the geometry and
    /// until-further-notice guard errors.
    #[allow(clippy::too_many_lines)]
    pub fn add_event(
        &mut self,
        draft: DraftEvent,
        originator: Originator,
    ) -> Result<EventId, SessionError> {
        if let Some(id) = &draft.event_id {
            if !id.is_empty() && self.events.iter().any(|event| event.event_id() == id) {
                return Err(SessionError::DuplicateEvent(id.clone()));
            }
        }

        let now = self.clock.now();
        let site_id = draft
            .site_id
            .unwrap_or_else(|| self.config.site_id.clone());
        let creation_time = draft.creation_time.unwrap_or(now);
        let time_range = draft
            .time_range
            .unwrap_or_else(|| self.default_range(now));
        let type_key = draft.hazard_type.as_ref().map(HazardType::type_key);

        if let Some(config) = type_key
            .as_deref()
            .and_then(|key| self.config.hazard_types.get_by_key(key))
        {
            if let Some(limit) = config.point_limit {
                if draft.geometry.exterior_point_count() > limit {
                    return Err(SessionError::PointLimitExceeded {
                        event: draft.event_id.unwrap_or_default(),
                        limit,
                    });
                }
            }
            if time_range.has_until_further_notice() && !config.allow_until_further_notice {
                return Err(SessionError::UntilFurtherNoticeDisallowed(
                    draft.event_id.unwrap_or_default(),
                ));
            }
        }

        // A pre-set status is only honored when it passes the display
        // filter; otherwise the event enters as pending. Potential is
        // always kept as supplied.
        let mut status = draft.status.unwrap_or(Status::Pending);
        if status != Status::Potential
            && !self
                .config
                .settings
                .passes(&site_id, type_key.as_deref(), status)
        {
            debug!(?status, "pre-set status fails the display filter, demoting");
            status = Status::Pending;
        }

        let event_id = match draft.event_id {
            Some(id) if !id.is_empty() => id,
            _ => self
                .ids
                .generate_id(&site_id)
                .map_err(|error| SessionError::IdGeneration {
                    site: site_id.as_str().to_owned(),
                    reason: error.reason,
                })?,
        };

        let mut attributes = draft.attributes;
        attributes
            .entry(ATTR_CATEGORY.to_owned())
            .or_insert_with(|| Value::String(self.config.settings.default_category.clone()));
        attributes.insert(ATTR_SELECTED.to_owned(), Value::Bool(true));

        let record = EventRecord::new(RecordParams {
            event_id: event_id.clone(),
            site_id,
            product_class: self.config.product_class,
            hazard_type: draft.hazard_type,
            time_range,
            geometry: draft.geometry,
            status,
            attributes,
            visual_features: draft.visual_features,
            creation_time,
            source: RecordSource::Local,
        });

        // Only locally-added events lose their selection; store-loaded
        // ones keep whatever the operator selected.
        let mut deselections = Vec::new();
        if !self.config.settings.add_to_selected {
            for event in &mut self.events {
                if event.source() != RecordSource::Local {
                    continue;
                }
                if let Some(modification) = event.set_selected(false) {
                    deselections.push((event.event_id().clone(), modification));
                }
            }
        }

        info!(event_id = %event_id, "event added");
        self.events.push(record);
        for (id, modification) in deselections {
            self.queue.post(Notification::EventModified {
                originator,
                event_id: id,
                modifications: vec![modification],
            });
        }
        self.queue.post(Notification::EventsAdded {
            originator,
            event_ids: [event_id.clone()].into_iter().collect(),
        });
        self.recompute_conflicts(originator)?;
        Ok(event_id)
    }

    /// Load events matching the filter from the store into the session.
    ///
    /// Each event adopts its latest persisted snapshot; identifiers already
    /// managed are skipped. A stored status failing the display filter is
    /// demoted to pending. Returns the identifiers actually loaded.
    ///
    /// # Errors
    ///
    /// Propagates store failures; partial loads do not occur.
    pub fn load_from_store(
        &mut self,
        filter: &StoreFilter,
        originator: Originator,
    ) -> Result<Vec<EventId>, SessionError> {
        let histories = self.store.events_by_filter(filter)?;
        let now = self.clock.now();
        let mut loaded = Vec::new();

        for (event_id, history) in histories {
            if self.events.iter().any(|event| *event.event_id() == event_id) {
                continue;
            }
            let Some(latest) = history.last() else {
                continue;
            };
            let mut record = latest.clone();
            record.set_source(RecordSource::Store);
            if !self.config.settings.passes(
                record.site_id(),
                record.type_key().as_deref(),
                record.status(),
            ) {
                record.set_status(Status::Pending);
            }
            record.clear_change_history();
            if record.status() == Status::Issued && minute_floor(record.time_range().end) > now {
                self.scheduler.schedule(&event_id, record.time_range());
            }
            self.events.push(record);
            loaded.push(event_id);
        }

        if !loaded.is_empty() {
            info!(count = loaded.len(), "events loaded from store");
            self.queue.post(Notification::EventsAdded {
                originator,
                event_ids: loaded.iter().cloned().collect(),
            });
            self.recompute_conflicts(originator)?;
        }
        Ok(loaded)
    }

    /// Merge an incoming copy of a managed event into the session, field
    /// by field through the guards. Bookkeeping attributes (selected,
    /// checked, issued) keep their session-local values.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier, and the
    /// locked-field guard errors; guard violations are detected before any
    /// field is applied.
    pub fn merge_event(
        &mut self,
        incoming: &EventRecord,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        let index = self.position(incoming.event_id())?;
        let config = self.config_for(index);
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(incoming.event_id().clone()));
        };

        // Validate locked fields up front so a rejection applies nothing.
        if event.is_issued() {
            if event.hazard_type() != incoming.hazard_type() {
                return Err(SessionError::IllegalModification {
                    field: squall_types::FieldKind::HazardType,
                });
            }
            if event.time_range() != incoming.time_range()
                && !config.as_ref().is_some_and(|entry| entry.allow_time_change)
            {
                return Err(SessionError::IllegalModification {
                    field: squall_types::FieldKind::TimeRange,
                });
            }
            if !event.geometry().equivalent(incoming.geometry())
                && !config.as_ref().is_some_and(|entry| entry.allow_area_change)
            {
                return Err(SessionError::IllegalModification {
                    field: squall_types::FieldKind::Geometry,
                });
            }
        }

        let mut modifications = Vec::new();
        if let Some(m) = event.set_hazard_type(incoming.hazard_type().cloned())? {
            modifications.push(m);
        }
        if let Some(m) = event.set_time_range(*incoming.time_range(), config.as_ref())? {
            modifications.push(m);
        }
        if let Some(m) = event.set_geometry(incoming.geometry().clone(), config.as_ref())? {
            modifications.push(m);
        }
        let mut changes = AttributeMap::new();
        for (key, value) in incoming.attributes() {
            if !PROTECTED_ATTRIBUTES.contains(&key.as_str()) {
                changes.insert(key.clone(), value.clone());
            }
        }
        for key in event.attributes().keys() {
            if !incoming.attributes().contains_key(key)
                && !PROTECTED_ATTRIBUTES.contains(&key.as_str())
            {
                changes.insert(key.clone(), Value::Null);
            }
        }
        if let Some(m) = event.set_attributes(changes) {
            modifications.push(m);
        }
        if let Some(m) = event.set_visual_features(incoming.visual_features().to_vec()) {
            modifications.push(m);
        }
        if let Some(m) = event.set_creation_time(incoming.creation_time()) {
            modifications.push(m);
        }
        if let Some(m) = event.set_issuance_count(incoming.issuance_count()) {
            modifications.push(m);
        }
        // Status is copied directly, without lifecycle side effects; the
        // explicit propose/issue/end operations carry those.
        if let Some(m) = event.set_status(incoming.status()) {
            modifications.push(m);
        }

        if modifications.is_empty() {
            return Ok(false);
        }
        let event_id = event.event_id().clone();
        let range = *event.time_range();
        if event.status() == Status::Issued {
            self.scheduler.schedule(&event_id, &range);
        }
        self.last_modified = Some(event_id.clone());
        self.queue.post(Notification::EventModified {
            originator,
            event_id,
            modifications,
        });
        self.recompute_conflicts(originator)?;
        Ok(true)
    }

    // -- field updates -----------------------------------------------------

    /// Change an event's footprint. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// [`SessionError::PointLimitExceeded`] against the type's configured
    /// limit, plus the locked-field guard error for issued events.
    pub fn update_geometry(
        &mut self,
        event_id: &EventId,
        geometry: EventGeometry,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        let index = self.position(event_id)?;
        let config = self.config_for(index);
        if let Some(limit) = config.as_ref().and_then(|entry| entry.point_limit) {
            if geometry.exterior_point_count() > limit {
                return Err(SessionError::PointLimitExceeded {
                    event: event_id.clone(),
                    limit,
                });
            }
        }
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        let Some(modification) = event.set_geometry(geometry, config.as_ref())? else {
            return Ok(false);
        };
        self.post_modification(event_id.clone(), modification, originator);
        self.recompute_conflicts(originator)?;
        Ok(true)
    }

    /// Change an event's validity time range. Returns whether anything
    /// changed. An issued event's expiration wake follows the new range.
    ///
    /// # Errors
    ///
    /// [`SessionError::UntilFurtherNoticeDisallowed`] when the range ends
    /// at the sentinel and the type does not allow it, plus the
    /// locked-field guard error for issued events.
    pub fn update_time_range(
        &mut self,
        event_id: &EventId,
        range: TimeRange,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        let index = self.position(event_id)?;
        let config = self.config_for(index);
        if range.has_until_further_notice()
            && !config
                .as_ref()
                .is_some_and(|entry| entry.allow_until_further_notice)
        {
            return Err(SessionError::UntilFurtherNoticeDisallowed(event_id.clone()));
        }
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        let Some(modification) = event.set_time_range(range, config.as_ref())? else {
            return Ok(false);
        };
        if event.status() == Status::Issued {
            self.scheduler.schedule(event_id, &range);
        }
        self.post_modification(event_id.clone(), modification, originator);
        self.recompute_conflicts(originator)?;
        Ok(true)
    }

    /// Change an event's hazard type. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// The locked-field guard error: the type never changes after
    /// issuance.
    pub fn update_hazard_type(
        &mut self,
        event_id: &EventId,
        hazard_type: Option<HazardType>,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        let index = self.position(event_id)?;
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        let Some(modification) = event.set_hazard_type(hazard_type)? else {
            return Ok(false);
        };
        self.post_modification(event_id.clone(), modification, originator);
        self.recompute_conflicts(originator)?;
        Ok(true)
    }

    /// Apply a batch of attribute changes to an event. Bookkeeping
    /// attributes are silently dropped from the batch; use the dedicated
    /// selection and checked operations instead. Returns whether anything
    /// changed.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier.
    pub fn update_attributes(
        &mut self,
        event_id: &EventId,
        mut changes: AttributeMap,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        changes.retain(|key, _value| !PROTECTED_ATTRIBUTES.contains(&key.as_str()));
        if changes.is_empty() {
            return Ok(false);
        }
        let index = self.position(event_id)?;
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        let Some(modification) = event.set_attributes(changes) else {
            return Ok(false);
        };
        self.post_modification(event_id.clone(), modification, originator);
        Ok(true)
    }

    /// Toggle an event's until-further-notice end. Enabling stashes the
    /// bounded end time in an attribute; disabling restores it (or falls
    /// back to the default duration from now). Returns whether anything
    /// changed.
    ///
    /// # Errors
    ///
    /// [`SessionError::UntilFurtherNoticeDisallowed`] when the type does
    /// not allow the sentinel, plus the locked-field guard error.
    pub fn set_until_further_notice(
        &mut self,
        event_id: &EventId,
        enabled: bool,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        let index = self.position(event_id)?;
        let config = self.config_for(index);
        let now = self.clock.now();
        let default_secs = self.config.settings.default_duration_secs;
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        let current = *event.time_range();
        let mut modifications = Vec::new();

        if enabled {
            if current.has_until_further_notice() {
                return Ok(false);
            }
            if !config
                .as_ref()
                .is_some_and(|entry| entry.allow_until_further_notice)
            {
                return Err(SessionError::UntilFurtherNoticeDisallowed(event_id.clone()));
            }
            // The range change goes through the guard first; a rejection
            // must leave the stash attribute untouched.
            let range = TimeRange::new(current.start, TimeRange::until_further_notice());
            if let Some(m) = event.set_time_range(range, config.as_ref())? {
                modifications.push(m);
            }
            if let Some(m) = event.set_attribute(
                ATTR_PRIOR_END,
                serde_json::to_value(current.end).unwrap_or(Value::Null),
            ) {
                modifications.push(m);
            }
        } else {
            if !current.has_until_further_notice() {
                return Ok(false);
            }
            let restored = event
                .attributes()
                .get(ATTR_PRIOR_END)
                .and_then(|value| serde_json::from_value::<DateTime<Utc>>(value.clone()).ok())
                .unwrap_or_else(|| {
                    now.checked_add_signed(chrono::Duration::seconds(default_secs))
                        .unwrap_or(now)
                });
            let range = TimeRange::new(current.start, restored);
            if let Some(m) = event.set_time_range(range, config.as_ref())? {
                modifications.push(m);
            }
            if let Some(m) = event.set_attribute(ATTR_PRIOR_END, Value::Null) {
                modifications.push(m);
            }
        }

        if modifications.is_empty() {
            return Ok(false);
        }
        let range = *event.time_range();
        let issued_now = event.status() == Status::Issued;
        if issued_now {
            self.scheduler.schedule(event_id, &range);
        }
        self.last_modified = Some(event_id.clone());
        self.queue.post(Notification::EventModified {
            originator,
            event_id: event_id.clone(),
            modifications,
        });
        Ok(true)
    }

    // -- selection and ordering --------------------------------------------

    /// Make exactly the given events selected; every other event is
    /// deselected. Recomputes conflicts when the selection changed.
    ///
    /// # Errors
    ///
    /// Propagates hatch failures from the conflict recomputation.
    pub fn select_events(
        &mut self,
        event_ids: &BTreeSet<EventId>,
        originator: Originator,
    ) -> Result<(), SessionError> {
        let mut changed = Vec::new();
        for event in &mut self.events {
            let desired = event_ids.contains(event.event_id());
            if let Some(modification) = event.set_selected(desired) {
                changed.push((event.event_id().clone(), modification));
            }
        }
        if changed.is_empty() {
            return Ok(());
        }
        for (event_id, modification) in changed {
            self.post_modification(event_id, modification, originator);
        }
        self.recompute_conflicts(originator)
    }

    /// Set an event's checked flag. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier.
    pub fn set_checked(
        &mut self,
        event_id: &EventId,
        checked: bool,
        originator: Originator,
    ) -> Result<bool, SessionError> {
        let index = self.position(event_id)?;
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        let Some(modification) = event.set_checked(checked) else {
            return Ok(false);
        };
        self.post_modification(event_id.clone(), modification, originator);
        Ok(true)
    }

    /// Reorder the collection with the given comparator and announce the
    /// new ordering.
    pub fn sort_events_by<F>(&mut self, compare: F, originator: Originator)
    where
        F: FnMut(&EventRecord, &EventRecord) -> CmpOrdering,
    {
        self.events.sort_by(compare);
        self.queue.post(Notification::OrderingChanged { originator });
    }

    // -- lifecycle ---------------------------------------------------------

    /// Move an event to proposed. Ignored when the event has no hazard
    /// type or the edge is illegal from its current status.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier.
    pub fn propose(
        &mut self,
        event_id: &EventId,
        originator: Originator,
    ) -> Result<TransitionOutcome, SessionError> {
        let index = self.position(event_id)?;
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        if event.hazard_type().is_none() {
            warn!(event_id = %event_id, "cannot propose an event without a hazard type");
            return Ok(TransitionOutcome::Ignored);
        }
        if !event.status().can_transition(Status::Proposed) {
            debug!(event_id = %event_id, status = ?event.status(), "propose ignored");
            return Ok(TransitionOutcome::Ignored);
        }
        let Some(modification) = event.set_status(Status::Proposed) else {
            return Ok(TransitionOutcome::Ignored);
        };
        self.post_modification(event_id.clone(), modification, originator);
        Ok(TransitionOutcome::Applied)
    }

    /// Issue an event: move it to issued, mark it issued, bump the
    /// issuance counter, persist a snapshot, and arm its expiration wake.
    /// Ignored from any status other than pending or proposed (ended
    /// events return to issued only through clock movement).
    ///
    /// A persistence failure is logged and does not undo the issuance.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier.
    pub fn issue(
        &mut self,
        event_id: &EventId,
        originator: Originator,
    ) -> Result<TransitionOutcome, SessionError> {
        let index = self.position(event_id)?;
        let Some(event) = self.events.get_mut(index) else {
            return Err(SessionError::EventNotFound(event_id.clone()));
        };
        if event.hazard_type().is_none() {
            warn!(event_id = %event_id, "cannot issue an event without a hazard type");
            return Ok(TransitionOutcome::Ignored);
        }
        if !matches!(event.status(), Status::Pending | Status::Proposed) {
            debug!(event_id = %event_id, status = ?event.status(), "issue ignored");
            return Ok(TransitionOutcome::Ignored);
        }

        let mut modifications = Vec::new();
        if let Some(m) = event.set_status(Status::Issued) {
            modifications.push(m);
        }
        if let Some(m) = event.set_issued(true) {
            modifications.push(m);
        }
        let count = event.issuance_count().saturating_add(1);
        if let Some(m) = event.set_issuance_count(count) {
            modifications.push(m);
        }
        event.clear_change_history();
        let snapshot = event.clone();
        let range = *event.time_range();

        info!(event_id = %event_id, issuance = count, "event issued");
        self.scheduler.schedule(event_id, &range);
        self.last_modified = Some(event_id.clone());
        self.queue.post(Notification::EventModified {
            originator,
            event_id: event_id.clone(),
            modifications,
        });
        // Downstream consumers see the status change before persistence.
        self.flush_notifications();
        self.persist(&snapshot, count == 1);
        Ok(TransitionOutcome::Applied)
    }

    /// End an issued event: move it to ended, deselect it, cancel its
    /// wake, and persist a final snapshot. Ignored from any status other
    /// than issued.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier, and
    /// hatch failures from the conflict recomputation.
    pub fn end(
        &mut self,
        event_id: &EventId,
        originator: Originator,
    ) -> Result<TransitionOutcome, SessionError> {
        let index = self.position(event_id)?;
        let status = self
            .events
            .get(index)
            .map(EventRecord::status)
            .unwrap_or(Status::Potential);
        if status != Status::Issued {
            debug!(event_id = %event_id, ?status, "end ignored");
            return Ok(TransitionOutcome::Ignored);
        }
        self.finish_event(index, originator)?;
        Ok(TransitionOutcome::Applied)
    }

    /// Remove an event from the session. With `delete`, its persisted
    /// history is removed from the store as well.
    ///
    /// # Errors
    ///
    /// [`SessionError::EventNotFound`] for an unmanaged identifier, and
    /// hatch failures from the conflict recomputation.
    pub fn remove_event(
        &mut self,
        event_id: &EventId,
        delete: bool,
        originator: Originator,
    ) -> Result<(), SessionError> {
        let index = self.position(event_id)?;
        let removed = self.events.remove(index);
        if delete {
            match self.store.by_event_id(event_id) {
                Ok(history) => {
                    if let Err(error) = self.store.remove_events(&history) {
                        warn!(event_id = %event_id, %error, "failed to delete persisted history");
                    }
                }
                Err(error) => {
                    warn!(event_id = %event_id, %error, "failed to look up persisted history");
                }
            }
        }
        self.scheduler.cancel(event_id);
        self.detector.purge(event_id);
        if self.last_modified.as_ref() == Some(event_id) {
            self.last_modified = None;
        }
        info!(event_id = %event_id, status = ?removed.status(), "event removed");
        self.queue.post(Notification::EventsRemoved {
            originator,
            event_ids: [event_id.clone()].into_iter().collect(),
        });
        self.recompute_conflicts(originator)?;
        Ok(())
    }

    // -- clock and timers --------------------------------------------------

    /// One pump step: handle a latched clock discontinuity, end events
    /// whose expiration wakes are due, and deliver queued notifications.
    ///
    /// # Errors
    ///
    /// Propagates hatch failures from conflict recomputation.
    pub fn tick(&mut self) -> Result<(), SessionError> {
        if self.clock_dirty.swap(false, Ordering::SeqCst) {
            self.handle_clock_change()?;
        }
        self.fire_due_timers()?;
        self.flush_notifications();
        Ok(())
    }

    /// End every issued event whose expiration wake is due at the current
    /// simulated time, attributed to automation.
    ///
    /// # Errors
    ///
    /// Propagates hatch failures from conflict recomputation.
    pub fn fire_due_timers(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now();
        for event_id in self.scheduler.take_due(now) {
            if let Some(index) = self
                .events
                .iter()
                .position(|event| *event.event_id() == event_id)
            {
                debug!(event_id = %event_id, "expiration wake fired");
                self.finish_event(index, Originator::Automation)?;
            }
        }
        Ok(())
    }

    /// Detach from the clock, cancel pending wakes, and deliver whatever
    /// is still queued.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        if let Some(token) = self.clock_listener.take() {
            self.clock.unregister_change_listener(token);
        }
        self.flush_notifications();
        info!(site_id = %self.config.site_id, "session shut down");
    }

    // -- internals ---------------------------------------------------------

    /// React to a clock discontinuity: rebuild the wake table from
    /// scratch, reviving ended events the clock moved back across.
    fn handle_clock_change(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now();
        debug!(%now, "handling clock discontinuity");
        self.scheduler.cancel_all();

        // Revert every ended event: time may have moved backward past its
        // end. Ones still past due re-expire on this same pump step once
        // the wake table is rebuilt.
        let mut revived = Vec::new();
        for event in &mut self.events {
            if event.status() == Status::Ended {
                if let Some(modification) = event.set_status(Status::Issued) {
                    event.clear_change_history();
                    revived.push((event.event_id().clone(), modification));
                }
            }
        }
        for (event_id, modification) in revived {
            info!(event_id = %event_id, "ended event revived by clock movement");
            self.queue.post(Notification::EventModified {
                originator: Originator::Automation,
                event_id,
                modifications: vec![modification],
            });
        }

        let to_arm: Vec<(EventId, TimeRange)> = self
            .events
            .iter()
            .filter(|event| event.status() == Status::Issued)
            .map(|event| (event.event_id().clone(), *event.time_range()))
            .collect();
        for (event_id, range) in to_arm {
            self.scheduler.schedule(&event_id, &range);
        }
        self.recompute_conflicts(Originator::Automation)
    }

    /// Shared ending path for the user operation and expiration wakes.
    fn finish_event(
        &mut self,
        index: usize,
        originator: Originator,
    ) -> Result<(), SessionError> {
        let Some(event) = self.events.get_mut(index) else {
            return Ok(());
        };
        let mut modifications = Vec::new();
        if let Some(m) = event.set_status(Status::Ended) {
            modifications.push(m);
        }
        if let Some(m) = event.set_selected(false) {
            modifications.push(m);
        }
        event.clear_change_history();
        let snapshot = event.clone();
        let event_id = event.event_id().clone();

        info!(event_id = %event_id, "event ended");
        self.scheduler.cancel(&event_id);
        self.last_modified = Some(event_id.clone());
        self.queue.post(Notification::EventModified {
            originator,
            event_id,
            modifications,
        });
        self.flush_notifications();
        self.persist(&snapshot, false);
        self.recompute_conflicts(originator)
    }

    /// Recompute the selected-events conflict map and announce a change.
    fn recompute_conflicts(&mut self, originator: Originator) -> Result<(), SessionError> {
        let subjects: Vec<&EventRecord> = self
            .events
            .iter()
            .filter(|event| event.is_selected() && event.status() != Status::Ended)
            .collect();
        let candidates: Vec<&EventRecord> = self
            .events
            .iter()
            .filter(|event| event.status() != Status::Ended)
            .collect();
        let changed = self.detector.recompute(
            &subjects,
            &candidates,
            &self.config.hazard_types,
            self.resolver.as_ref(),
            self.alerts.as_ref(),
        )?;
        if changed {
            self.queue.post(Notification::SelectedConflictsChanged {
                originator,
                conflicts: self.detector.current().clone(),
            });
        }
        Ok(())
    }

    /// Persist one snapshot, logging (not propagating) a backend failure.
    fn persist(&self, snapshot: &EventRecord, first: bool) {
        let result = if first {
            self.store.create_event(snapshot)
        } else {
            self.store.store_event(snapshot)
        };
        if let Err(error) = result {
            warn!(event_id = %snapshot.event_id(), %error, "failed to persist event snapshot");
        }
    }

    fn post_modification(
        &mut self,
        event_id: EventId,
        modification: squall_events::Modification,
        originator: Originator,
    ) {
        self.last_modified = Some(event_id.clone());
        self.queue.post(Notification::EventModified {
            originator,
            event_id,
            modifications: vec![modification],
        });
    }

    fn position(&self, event_id: &EventId) -> Result<usize, SessionError> {
        self.events
            .iter()
            .position(|event| event.event_id() == event_id)
            .ok_or_else(|| SessionError::EventNotFound(event_id.clone()))
    }

    fn config_for(&self, index: usize) -> Option<HazardTypeConfig> {
        self.events
            .get(index)
            .and_then(EventRecord::hazard_type)
            .and_then(|hazard_type| self.config.hazard_types.get(hazard_type))
            .cloned()
    }

    fn default_range(&self, start: DateTime<Utc>) -> TimeRange {
        let end = start
            .checked_add_signed(chrono::Duration::seconds(
                self.config.settings.default_duration_secs,
            ))
            .unwrap_or(start);
        TimeRange::new(start, end)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(token) = self.clock_listener.take() {
            self.clock.unregister_change_listener(token);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use geo::polygon;
    use serde_json::json;
    use squall_types::HazardType;

    use super::*;
    use crate::alert::LogAlertChannel;
    use crate::clock::SimulatedClock;
    use crate::config::{DisplaySettings, HatchSpec, HazardTypeConfig, HazardTypeTable};
    use crate::hatch::ZoneTableResolver;
    use crate::ident::SiteSequenceIds;
    use crate::store::{FailingStore, MemoryStore};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 26, h, m, 0).unwrap()
    }

    fn square(offset: f64) -> EventGeometry {
        EventGeometry::polygon(polygon![
            (x: offset, y: offset),
            (x: offset + 1.0, y: offset),
            (x: offset + 1.0, y: offset + 1.0),
            (x: offset, y: offset + 1.0),
        ])
    }

    fn test_table() -> HazardTypeTable {
        let mut table = HazardTypeTable::new();
        table.insert(
            "FF.W",
            HazardTypeConfig {
                conflict_list: ["FA.W".to_owned()].into_iter().collect(),
                allow_until_further_notice: true,
                hatch_area: HatchSpec::Direct,
                ..HazardTypeConfig::default()
            },
        );
        table.insert(
            "FA.W",
            HazardTypeConfig {
                conflict_list: ["FF.W".to_owned()].into_iter().collect(),
                hatch_area: HatchSpec::Direct,
                ..HazardTypeConfig::default()
            },
        );
        table
    }

    struct Fixture {
        session: SessionManager,
        clock: Arc<SimulatedClock>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_settings(DisplaySettings::default())
    }

    fn fixture_with_settings(settings: DisplaySettings) -> Fixture {
        let clock = Arc::new(SimulatedClock::with_state(at(10, 0), true));
        let store = Arc::new(MemoryStore::new());
        let config = SessionConfig {
            site_id: squall_types::SiteId::from("OAX"),
            product_class: squall_types::ProductClass::Practice,
            hazard_types: test_table(),
            settings,
        };
        let session = SessionManager::new(SessionParams {
            config,
            clock: Arc::clone(&clock) as Arc<dyn SessionClock>,
            store: Arc::clone(&store) as Arc<dyn EventStore>,
            resolver: Arc::new(ZoneTableResolver::default()),
            ids: Arc::new(SiteSequenceIds::new()),
            alerts: Arc::new(LogAlertChannel),
        });
        Fixture {
            session,
            clock,
            store,
        }
    }

    fn capture(session: &mut SessionManager) -> Arc<Mutex<Vec<Notification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(
            0,
            [
                NotificationKind::EventModified,
                NotificationKind::EventsAdded,
                NotificationKind::EventsRemoved,
                NotificationKind::OrderingChanged,
                NotificationKind::SelectedConflictsChanged,
            ]
            .into_iter()
            .collect(),
            Box::new(move |notification| {
                if let Ok(mut list) = sink.lock() {
                    list.push(notification.clone());
                }
            }),
        );
        seen
    }

    #[test]
    fn add_event_applies_defaults() {
        let mut fx = fixture();
        let id = fx
            .session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        assert_eq!(id.as_str(), "HZ-OAX-000001");

        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.status(), Status::Pending);
        assert_eq!(event.site_id().as_str(), "OAX");
        assert_eq!(event.creation_time(), at(10, 0));
        assert_eq!(*event.time_range(), TimeRange::new(at(10, 0), at(11, 0)));
        assert_eq!(event.attributes().get("category"), Some(&json!("Hydrology")));
        assert!(event.is_selected());
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_event_id(EventId::from("HZ-X-1"));
        fx.session.add_event(draft.clone(), Originator::User).unwrap();
        assert!(matches!(
            fx.session.add_event(draft, Originator::User),
            Err(SessionError::DuplicateEvent(_))
        ));
    }

    #[test]
    fn adding_replaces_the_selection_by_default() {
        let mut fx = fixture();
        let first = fx
            .session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        let second = fx
            .session
            .add_event(DraftEvent::new(square(5.0)), Originator::User)
            .unwrap();
        assert!(!fx.session.event(&first).unwrap().is_selected());
        assert!(fx.session.event(&second).unwrap().is_selected());
    }

    #[test]
    fn add_to_selected_extends_the_selection() {
        let settings = DisplaySettings {
            add_to_selected: true,
            ..DisplaySettings::default()
        };
        let mut fx = fixture_with_settings(settings);
        let first = fx
            .session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        let second = fx
            .session
            .add_event(DraftEvent::new(square(5.0)), Originator::User)
            .unwrap();
        assert!(fx.session.event(&first).unwrap().is_selected());
        assert!(fx.session.event(&second).unwrap().is_selected());
    }

    #[test]
    fn adding_deselects_only_locally_added_events() {
        let mut fx = fixture();
        let stored_id = EventId::from("HZ-OAX-STORED");
        fx.store
            .create_event(&EventRecord::new(RecordParams {
                event_id: stored_id.clone(),
                site_id: squall_types::SiteId::from("OAX"),
                product_class: squall_types::ProductClass::Practice,
                hazard_type: Some(HazardType::new("FF", "W")),
                time_range: TimeRange::new(at(10, 0), at(11, 0)),
                geometry: square(0.0),
                status: Status::Pending,
                attributes: AttributeMap::new(),
                visual_features: Vec::new(),
                creation_time: at(9, 0),
                source: RecordSource::Store,
            }))
            .unwrap();
        fx.session
            .load_from_store(&StoreFilter::default(), Originator::User)
            .unwrap();
        fx.session
            .select_events(&[stored_id.clone()].into_iter().collect(), Originator::User)
            .unwrap();

        let added = fx
            .session
            .add_event(DraftEvent::new(square(5.0)), Originator::User)
            .unwrap();
        assert!(fx.session.event(&stored_id).unwrap().is_selected());
        assert!(fx.session.event(&added).unwrap().is_selected());
    }

    #[test]
    fn preset_status_failing_the_filter_is_demoted() {
        let settings = DisplaySettings {
            visible_statuses: [Status::Pending].into_iter().collect(),
            ..DisplaySettings::default()
        };
        let mut fx = fixture_with_settings(settings);
        let draft = DraftEvent::new(square(0.0)).with_status(Status::Issued);
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Pending);
    }

    #[test]
    fn propose_requires_a_hazard_type() {
        let mut fx = fixture();
        let id = fx
            .session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        let outcome = fx.session.propose(&id, Originator::User).unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);

        fx.session
            .update_hazard_type(&id, Some(HazardType::new("FF", "W")), Originator::User)
            .unwrap();
        let outcome = fx.session.propose(&id, Originator::User).unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Proposed);
    }

    #[test]
    fn issue_persists_and_arms_expiration() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        let outcome = fx.session.issue(&id, Originator::User).unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);

        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.status(), Status::Issued);
        assert!(event.is_issued());
        assert_eq!(event.issuance_count(), 1);
        assert!(event.history().is_empty());
        assert_eq!(fx.store.event_count(), 1);
    }

    #[test]
    fn issue_from_ended_is_ignored() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();
        fx.session.end(&id, Originator::User).unwrap();
        let outcome = fx.session.issue(&id, Originator::User).unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Ended);
    }

    #[test]
    fn end_deselects_and_ignores_non_issued() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();

        // Not issued yet: end is a no-op.
        let outcome = fx.session.end(&id, Originator::User).unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);

        fx.session.issue(&id, Originator::User).unwrap();
        let outcome = fx.session.end(&id, Originator::User).unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.status(), Status::Ended);
        assert!(!event.is_selected());
    }

    #[test]
    fn expiration_wake_ends_the_event_via_automation() {
        let mut fx = fixture();
        let seen = capture(&mut fx.session);
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();

        // Jump past the one-hour default range.
        fx.clock.set_time(at(11, 30));
        fx.session.tick().unwrap();

        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Ended);
        let notifications = seen.lock().unwrap();
        let ended_by_automation = notifications.iter().any(|notification| {
            matches!(
                notification,
                Notification::EventModified {
                    originator: Originator::Automation,
                    ..
                }
            )
        });
        assert!(ended_by_automation);
    }

    #[test]
    fn clock_moving_back_revives_an_ended_event() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();

        fx.clock.set_time(at(12, 0));
        fx.session.tick().unwrap();
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Ended);

        fx.clock.set_time(at(10, 15));
        fx.session.tick().unwrap();
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Issued);
    }

    #[test]
    fn discontinuity_past_the_end_bounces_the_event_back_to_ended() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();

        fx.clock.set_time(at(12, 0));
        fx.session.tick().unwrap();
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Ended);

        // Still past the end time: the revert-all protocol revives the
        // event and the rebuilt wake table re-expires it on the same pump.
        fx.clock.set_time(at(13, 0));
        fx.session.tick().unwrap();
        assert_eq!(fx.session.event(&id).unwrap().status(), Status::Ended);
        assert_eq!(fx.store.by_event_id(&id).unwrap().len(), 3);
    }

    #[test]
    fn until_further_notice_round_trip() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();

        assert!(
            fx.session
                .set_until_further_notice(&id, true, Originator::User)
                .unwrap()
        );
        assert!(
            fx.session
                .event(&id)
                .unwrap()
                .time_range()
                .has_until_further_notice()
        );

        assert!(
            fx.session
                .set_until_further_notice(&id, false, Originator::User)
                .unwrap()
        );
        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.time_range().end, at(11, 0));
        assert!(!event.attributes().contains_key("priorEndTime"));
    }

    #[test]
    fn until_further_notice_requires_allowance() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FA", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        assert!(matches!(
            fx.session.set_until_further_notice(&id, true, Originator::User),
            Err(SessionError::UntilFurtherNoticeDisallowed(_))
        ));
    }

    #[test]
    fn rejected_ufn_enable_leaves_the_event_untouched() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();
        fx.session.flush_notifications();

        // FF.W allows the sentinel but locks the time range after issuance,
        // so enabling fails; the stash attribute must not leak through.
        assert!(matches!(
            fx.session.set_until_further_notice(&id, true, Originator::User),
            Err(SessionError::IllegalModification { .. })
        ));
        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.time_range().end, at(11, 0));
        assert!(!event.attributes().contains_key("priorEndTime"));
        assert!(!event.is_modified());
        assert!(event.history().is_empty());
        assert_eq!(fx.session.pending_notification_count(), 0);
    }

    #[test]
    fn overlapping_selected_events_report_a_conflict() {
        let mut fx = fixture();
        let seen = capture(&mut fx.session);
        let first = fx
            .session
            .add_event(
                DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W")),
                Originator::User,
            )
            .unwrap();
        let second = fx
            .session
            .add_event(
                DraftEvent::new(square(0.5)).with_hazard_type(HazardType::new("FA", "W")),
                Originator::User,
            )
            .unwrap();

        fx.session
            .select_events(
                &[first.clone(), second.clone()].into_iter().collect(),
                Originator::User,
            )
            .unwrap();
        fx.session.flush_notifications();

        let conflicts = fx.session.conflicts();
        assert!(conflicts.get(&first).is_some_and(|e| e.contains_key(&second)));
        assert!(conflicts.get(&second).is_some_and(|e| e.contains_key(&first)));
        let announced = seen
            .lock()
            .unwrap()
            .iter()
            .any(|n| matches!(n, Notification::SelectedConflictsChanged { .. }));
        assert!(announced);
    }

    #[test]
    fn removing_an_event_clears_it_everywhere() {
        let mut fx = fixture();
        let seen = capture(&mut fx.session);
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();
        fx.session.remove_event(&id, true, Originator::User).unwrap();
        fx.session.flush_notifications();

        assert!(fx.session.event(&id).is_none());
        assert_eq!(fx.store.event_count(), 0);
        let removed = seen
            .lock()
            .unwrap()
            .iter()
            .any(|n| matches!(n, Notification::EventsRemoved { .. }));
        assert!(removed);
    }

    #[test]
    fn delete_survives_a_failing_history_lookup() {
        let clock = Arc::new(SimulatedClock::with_state(at(10, 0), true));
        let mut session = SessionManager::new(SessionParams {
            config: SessionConfig {
                site_id: squall_types::SiteId::from("OAX"),
                product_class: squall_types::ProductClass::Practice,
                hazard_types: test_table(),
                settings: DisplaySettings::default(),
            },
            clock,
            store: Arc::new(FailingStore),
            resolver: Arc::new(ZoneTableResolver::default()),
            ids: Arc::new(SiteSequenceIds::new()),
            alerts: Arc::new(LogAlertChannel),
        });
        let id = session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        // The lookup failure is logged, not propagated.
        session.remove_event(&id, true, Originator::User).unwrap();
        assert!(session.event(&id).is_none());
    }

    #[test]
    fn load_from_store_adopts_latest_snapshots() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();
        fx.session.issue(&id, Originator::User).unwrap();

        // A second session over the same store sees the issued event.
        let store = Arc::clone(&fx.store);
        let clock = Arc::new(SimulatedClock::with_state(at(10, 30), true));
        let mut other = SessionManager::new(SessionParams {
            config: SessionConfig {
                site_id: squall_types::SiteId::from("OAX"),
                product_class: squall_types::ProductClass::Practice,
                hazard_types: test_table(),
                settings: DisplaySettings::default(),
            },
            clock,
            store,
            resolver: Arc::new(ZoneTableResolver::default()),
            ids: Arc::new(SiteSequenceIds::new()),
            alerts: Arc::new(LogAlertChannel),
        });
        let loaded = other
            .load_from_store(&StoreFilter::default(), Originator::User)
            .unwrap();
        assert_eq!(loaded, vec![id.clone()]);
        let event = other.event(&id).unwrap();
        assert_eq!(event.status(), Status::Issued);
        assert_eq!(event.source(), RecordSource::Store);
    }

    #[test]
    fn attribute_updates_cannot_touch_bookkeeping_keys() {
        let mut fx = fixture();
        let id = fx
            .session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        let mut changes = AttributeMap::new();
        changes.insert("selected".to_owned(), json!(false));
        changes.insert("issued".to_owned(), json!(true));
        let changed = fx
            .session
            .update_attributes(&id, changes, Originator::User)
            .unwrap();
        assert!(!changed);
        let event = fx.session.event(&id).unwrap();
        assert!(event.is_selected());
        assert!(!event.is_issued());
    }

    #[test]
    fn sort_announces_ordering_change() {
        let mut fx = fixture();
        let seen = capture(&mut fx.session);
        fx.session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        fx.session
            .add_event(DraftEvent::new(square(5.0)), Originator::User)
            .unwrap();
        fx.session.sort_events_by(
            |a, b| b.event_id().cmp(a.event_id()),
            Originator::User,
        );
        fx.session.flush_notifications();

        let ids: Vec<&str> = fx
            .session
            .events()
            .iter()
            .map(|event| event.event_id().as_str())
            .collect();
        assert_eq!(ids, vec!["HZ-OAX-000002", "HZ-OAX-000001"]);
        let announced = seen
            .lock()
            .unwrap()
            .iter()
            .any(|n| matches!(n, Notification::OrderingChanged { .. }));
        assert!(announced);
    }

    #[test]
    fn merge_preserves_bookkeeping_attributes() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();

        let mut incoming = fx.session.event(&id).unwrap().clone();
        incoming.set_attribute("severity", json!("extreme"));
        // A remote copy claiming deselection must not override the
        // session-local bookkeeping.
        incoming.set_attribute("selected", json!(false));

        let changed = fx.session.merge_event(&incoming, Originator::Remote).unwrap();
        assert!(changed);
        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.attributes().get("severity"), Some(&json!("extreme")));
        assert!(event.is_selected());
    }

    #[test]
    fn merge_copies_creation_time_and_issuance_count() {
        let mut fx = fixture();
        let draft = DraftEvent::new(square(0.0)).with_hazard_type(HazardType::new("FF", "W"));
        let id = fx.session.add_event(draft, Originator::User).unwrap();

        let mut incoming = fx.session.event(&id).unwrap().clone();
        incoming.set_creation_time(at(9, 30));
        incoming.set_issuance_count(3);

        assert!(fx.session.merge_event(&incoming, Originator::Remote).unwrap());
        let event = fx.session.event(&id).unwrap();
        assert_eq!(event.creation_time(), at(9, 30));
        assert_eq!(event.issuance_count(), 3);
    }

    #[test]
    fn last_modified_tracks_the_latest_change() {
        let mut fx = fixture();
        let id = fx
            .session
            .add_event(DraftEvent::new(square(0.0)), Originator::User)
            .unwrap();
        assert!(fx.session.last_modified_event().is_none());
        fx.session.set_checked(&id, true, Originator::User).unwrap();
        assert_eq!(
            fx.session.last_modified_event().map(EventRecord::event_id),
            Some(&id)
        );
        assert_eq!(fx.session.events_by_status(Status::Pending).len(), 1);
        assert!(fx.session.events_by_status(Status::Issued).is_empty());
    }

    #[test]
    fn unknown_event_is_an_error() {
        let mut fx = fixture();
        assert!(matches!(
            fx.session.end(&EventId::from("missing"), Originator::User),
            Err(SessionError::EventNotFound(_))
        ));
    }
}
