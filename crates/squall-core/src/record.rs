//! One hazard event's record and its mutation guard.
//!
//! Every field change flows through the guard methods here -- the session
//! never pokes fields directly. The guard compares the new value against
//! the current one with value equality (topological for geometry), does
//! nothing for a no-op change, rejects locked-field changes on issued
//! events, and returns a typed [`Modification`] for every change it
//! applies. The hazard-type configuration is passed in as an explicit
//! context parameter; records hold no back-reference to their manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use squall_events::Modification;
use squall_types::{
    ATTR_CHECKED, ATTR_ISSUED, ATTR_SELECTED, AttributeMap, EventGeometry, EventId, FieldKind,
    HazardType, ProductClass, RecordId, SiteId, Status, TimeRange,
};

use crate::config::HazardTypeConfig;
use crate::error::SessionError;

// ---------------------------------------------------------------------------
// Draft input
// ---------------------------------------------------------------------------

/// Caller-supplied input to `add_event`, before defaults are applied.
#[derive(Debug, Clone)]
pub struct DraftEvent {
    /// Public identifier; generated by the id collaborator when absent.
    pub event_id: Option<EventId>,
    /// Owning site; defaults to the session's site.
    pub site_id: Option<SiteId>,
    /// Complete type triple, or none.
    pub hazard_type: Option<HazardType>,
    /// Validity range; defaulted from the clock and configured duration.
    pub time_range: Option<TimeRange>,
    /// The footprint. Always required.
    pub geometry: EventGeometry,
    /// Initial status; `None` defaults to [`Status::Pending`].
    pub status: Option<Status>,
    /// Initial attributes; the category default is filled in when missing.
    pub attributes: AttributeMap,
    /// Attached visual feature identifiers.
    pub visual_features: Vec<String>,
    /// Creation instant; defaults to the clock reading.
    pub creation_time: Option<DateTime<Utc>>,
}

impl DraftEvent {
    /// Create a draft carrying only a geometry; everything else defaults.
    pub const fn new(geometry: EventGeometry) -> Self {
        Self {
            event_id: None,
            site_id: None,
            hazard_type: None,
            time_range: None,
            geometry,
            status: None,
            attributes: AttributeMap::new(),
            visual_features: Vec::new(),
            creation_time: None,
        }
    }

    /// Set the hazard type triple.
    #[must_use]
    pub fn with_hazard_type(mut self, hazard_type: HazardType) -> Self {
        self.hazard_type = Some(hazard_type);
        self
    }

    /// Set the validity time range.
    #[must_use]
    pub const fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Set the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the public identifier explicitly.
    #[must_use]
    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Where a record entered the session from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Created in this session by a forecaster or automation.
    Local,
    /// Loaded from the persistence store.
    Store,
}

/// Construction parameters for [`EventRecord`], assembled by the session
/// after defaulting a [`DraftEvent`].
#[derive(Debug, Clone)]
pub struct RecordParams {
    /// Public identifier (already generated if the draft lacked one).
    pub event_id: EventId,
    /// Owning site.
    pub site_id: SiteId,
    /// Session operating mode at creation.
    pub product_class: ProductClass,
    /// Complete type triple, or none.
    pub hazard_type: Option<HazardType>,
    /// Validity range.
    pub time_range: TimeRange,
    /// The footprint.
    pub geometry: EventGeometry,
    /// Initial status.
    pub status: Status,
    /// Initial attributes.
    pub attributes: AttributeMap,
    /// Attached visual feature identifiers.
    pub visual_features: Vec<String>,
    /// Creation instant.
    pub creation_time: DateTime<Utc>,
    /// Provenance of the record.
    pub source: RecordSource,
}

/// One hazard event as managed by the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    record_id: RecordId,
    event_id: EventId,
    site_id: SiteId,
    product_class: ProductClass,
    hazard_type: Option<HazardType>,
    time_range: TimeRange,
    geometry: EventGeometry,
    status: Status,
    attributes: AttributeMap,
    visual_features: Vec<String>,
    creation_time: DateTime<Utc>,
    issuance_count: u32,
    source: RecordSource,
    /// Set by any permitted mutation, cleared on issue/end.
    #[serde(skip)]
    modified: bool,
    /// Pending-change log since the last issue/end, newest last.
    #[serde(skip)]
    history: Vec<Modification>,
}

impl EventRecord {
    /// Build a record from assembled parameters.
    pub fn new(params: RecordParams) -> Self {
        Self {
            record_id: RecordId::new(),
            event_id: params.event_id,
            site_id: params.site_id,
            product_class: params.product_class,
            hazard_type: params.hazard_type,
            time_range: params.time_range,
            geometry: params.geometry,
            status: params.status,
            attributes: params.attributes,
            visual_features: params.visual_features,
            creation_time: params.creation_time,
            issuance_count: 0,
            source: params.source,
            modified: false,
            history: Vec::new(),
        }
    }

    // -- accessors ---------------------------------------------------------

    /// Internal unique identifier.
    pub const fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Public identifier.
    pub const fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Owning site.
    pub const fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    /// Session operating mode at creation.
    pub const fn product_class(&self) -> ProductClass {
        self.product_class
    }

    /// The type triple, when assigned.
    pub const fn hazard_type(&self) -> Option<&HazardType> {
        self.hazard_type.as_ref()
    }

    /// Configuration key of the type triple, when assigned.
    pub fn type_key(&self) -> Option<String> {
        self.hazard_type.as_ref().map(HazardType::type_key)
    }

    /// Validity range.
    pub const fn time_range(&self) -> &TimeRange {
        &self.time_range
    }

    /// The footprint.
    pub const fn geometry(&self) -> &EventGeometry {
        &self.geometry
    }

    /// Lifecycle status.
    pub const fn status(&self) -> Status {
        self.status
    }

    /// The attribute map.
    pub const fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Attached visual feature identifiers.
    pub fn visual_features(&self) -> &[String] {
        &self.visual_features
    }

    /// Creation instant.
    pub const fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    /// Number of times the event has been issued.
    pub const fn issuance_count(&self) -> u32 {
        self.issuance_count
    }

    /// Provenance of the record.
    pub const fn source(&self) -> RecordSource {
        self.source
    }

    /// Whether a permitted mutation happened since the last issue/end.
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Pending-change log since the last issue/end.
    pub fn history(&self) -> &[Modification] {
        &self.history
    }

    fn bool_attribute(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the event is in the current selection.
    pub fn is_selected(&self) -> bool {
        self.bool_attribute(ATTR_SELECTED)
    }

    /// Whether the event is checked.
    pub fn is_checked(&self) -> bool {
        self.bool_attribute(ATTR_CHECKED)
    }

    /// Whether the event has ever been issued.
    pub fn is_issued(&self) -> bool {
        self.bool_attribute(ATTR_ISSUED)
    }

    // -- mutation guard ----------------------------------------------------

    /// Change the lifecycle status.
    ///
    /// Edge legality is the session's concern; the record only suppresses
    /// no-op changes.
    pub fn set_status(&mut self, status: Status) -> Option<Modification> {
        if self.status == status {
            return None;
        }
        self.status = status;
        self.record(Modification::Status { status })
    }

    /// Change the hazard type triple.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalModification`] when the event has
    /// been issued: the type can never change after issuance.
    pub fn set_hazard_type(
        &mut self,
        hazard_type: Option<HazardType>,
    ) -> Result<Option<Modification>, SessionError> {
        if self.hazard_type == hazard_type {
            return Ok(None);
        }
        if self.is_issued() {
            return Err(SessionError::IllegalModification {
                field: FieldKind::HazardType,
            });
        }
        self.hazard_type = hazard_type.clone();
        Ok(self.record(Modification::HazardType { hazard_type }))
    }

    /// Change the validity time range.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalModification`] when the event has
    /// been issued and the hazard-type configuration does not allow time
    /// changes (an unknown type allows nothing).
    pub fn set_time_range(
        &mut self,
        range: TimeRange,
        config: Option<&HazardTypeConfig>,
    ) -> Result<Option<Modification>, SessionError> {
        if self.time_range == range {
            return Ok(None);
        }
        if self.is_issued() && !config.is_some_and(|entry| entry.allow_time_change) {
            return Err(SessionError::IllegalModification {
                field: FieldKind::TimeRange,
            });
        }
        self.time_range = range;
        Ok(self.record(Modification::TimeRange { range }))
    }

    /// Change the footprint.
    ///
    /// No-op detection uses topological equality with a coordinate-exact
    /// fallback.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalModification`] when the event has
    /// been issued and the hazard-type configuration does not allow area
    /// changes.
    pub fn set_geometry(
        &mut self,
        geometry: EventGeometry,
        config: Option<&HazardTypeConfig>,
    ) -> Result<Option<Modification>, SessionError> {
        if self.geometry.equivalent(&geometry) {
            return Ok(None);
        }
        if self.is_issued() && !config.is_some_and(|entry| entry.allow_area_change) {
            return Err(SessionError::IllegalModification {
                field: FieldKind::Geometry,
            });
        }
        self.geometry = geometry.clone();
        Ok(self.record(Modification::Geometry { geometry }))
    }

    /// Apply a batch of attribute changes.
    ///
    /// Entries equal to the current value are dropped; a JSON `null` value
    /// clears the key. Returns `None` when nothing actually changed.
    pub fn set_attributes(&mut self, changes: AttributeMap) -> Option<Modification> {
        let mut applied = AttributeMap::new();
        let mut previous = squall_events::PriorValues::new();

        for (key, value) in changes {
            let current = self.attributes.get(&key);
            let clearing = value.is_null();
            let unchanged = if clearing {
                current.is_none()
            } else {
                current == Some(&value)
            };
            if unchanged {
                continue;
            }
            previous.insert(key.clone(), current.cloned());
            if clearing {
                self.attributes.remove(&key);
            } else {
                self.attributes.insert(key.clone(), value.clone());
            }
            applied.insert(key, value);
        }

        if applied.is_empty() {
            return None;
        }
        self.record(Modification::Attributes {
            changes: applied,
            previous,
        })
    }

    /// Set one attribute.
    pub fn set_attribute(
        &mut self,
        key: &str,
        value: serde_json::Value,
    ) -> Option<Modification> {
        let mut changes = AttributeMap::new();
        changes.insert(key.to_owned(), value);
        self.set_attributes(changes)
    }

    /// Set the `selected` bookkeeping attribute.
    pub fn set_selected(&mut self, selected: bool) -> Option<Modification> {
        self.set_attribute(ATTR_SELECTED, serde_json::Value::Bool(selected))
    }

    /// Set the `checked` bookkeeping attribute.
    pub fn set_checked(&mut self, checked: bool) -> Option<Modification> {
        self.set_attribute(ATTR_CHECKED, serde_json::Value::Bool(checked))
    }

    /// Set the `issued` bookkeeping attribute.
    pub fn set_issued(&mut self, issued: bool) -> Option<Modification> {
        self.set_attribute(ATTR_ISSUED, serde_json::Value::Bool(issued))
    }

    /// Replace the attached visual feature set.
    pub fn set_visual_features(&mut self, features: Vec<String>) -> Option<Modification> {
        if self.visual_features == features {
            return None;
        }
        self.visual_features = features.clone();
        self.record(Modification::VisualFeatures { features })
    }

    /// Change the creation instant.
    pub fn set_creation_time(&mut self, instant: DateTime<Utc>) -> Option<Modification> {
        if self.creation_time == instant {
            return None;
        }
        self.creation_time = instant;
        self.record(Modification::CreationTime { instant })
    }

    /// Change the issuance counter.
    pub fn set_issuance_count(&mut self, count: u32) -> Option<Modification> {
        if self.issuance_count == count {
            return None;
        }
        self.issuance_count = count;
        self.record(Modification::IssuanceCount { count })
    }

    /// Re-apply a modification produced elsewhere (e.g. from a remote
    /// workstation's notification).
    ///
    /// # Errors
    ///
    /// Propagates the guard errors of the underlying setter.
    pub fn apply(
        &mut self,
        modification: &Modification,
        config: Option<&HazardTypeConfig>,
    ) -> Result<Option<Modification>, SessionError> {
        match modification {
            Modification::Status { status } => Ok(self.set_status(*status)),
            Modification::Attributes { changes, .. } => Ok(self.set_attributes(changes.clone())),
            Modification::Geometry { geometry } => self.set_geometry(geometry.clone(), config),
            Modification::TimeRange { range } => self.set_time_range(*range, config),
            Modification::HazardType { hazard_type } => {
                self.set_hazard_type(hazard_type.clone())
            }
            Modification::VisualFeatures { features } => {
                Ok(self.set_visual_features(features.clone()))
            }
            Modification::CreationTime { instant } => Ok(self.set_creation_time(*instant)),
            Modification::IssuanceCount { count } => Ok(self.set_issuance_count(*count)),
        }
    }

    /// Clear the pending-change log and the modified flag (issue/end).
    pub fn clear_change_history(&mut self) {
        self.history.clear();
        self.modified = false;
    }

    /// Re-tag the record's provenance when it is adopted from the store.
    pub(crate) const fn set_source(&mut self, source: RecordSource) {
        self.source = source;
    }

    /// Assign the generated public identifier. Only legal while the id is
    /// still empty; returns whether the assignment happened.
    pub(crate) fn assign_event_id(&mut self, event_id: EventId) -> bool {
        if self.event_id.is_empty() {
            self.event_id = event_id;
            return true;
        }
        false
    }

    fn record(&mut self, modification: Modification) -> Option<Modification> {
        self.modified = true;
        self.history.push(modification.clone());
        Some(modification)
    }
}
