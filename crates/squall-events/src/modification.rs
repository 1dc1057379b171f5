//! Field-level change descriptions and their pairwise merge rules.
//!
//! A [`Modification`] describes exactly one field-level change to a hazard
//! event. It carries enough data to be re-applied to a target record and to
//! be merged with a later modification of the same kind, so that a burst of
//! edits collapses into the minimal net change before delivery.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use squall_types::{
    AttributeMap, EventGeometry, FieldKind, HazardType, Status, TimeRange,
};

/// Value a key held before a modification touched it; `None` means the key
/// was absent.
pub type PriorValues = BTreeMap<String, Option<serde_json::Value>>;

// ---------------------------------------------------------------------------
// Modification
// ---------------------------------------------------------------------------

/// One field-level change to a hazard event.
///
/// A closed sum type: the merge function matches exhaustively over variant
/// pairs, so adding a variant without a merge rule fails to compile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Modification {
    /// The lifecycle status changed.
    Status {
        /// The new status.
        status: Status,
    },
    /// One or more attribute-map entries changed.
    Attributes {
        /// The new values, keyed by attribute name. A JSON `null` value
        /// means the key was cleared.
        changes: AttributeMap,
        /// For every key in `changes`, the value it held before this
        /// modification. Needed to detect attribute round-trips on merge.
        previous: PriorValues,
    },
    /// The geometry changed.
    Geometry {
        /// The new footprint.
        geometry: EventGeometry,
    },
    /// The validity time range changed.
    TimeRange {
        /// The new range.
        range: TimeRange,
    },
    /// The hazard type triple changed.
    HazardType {
        /// The new type, or `None` when the type was cleared.
        hazard_type: Option<HazardType>,
    },
    /// The set of attached visual features changed.
    VisualFeatures {
        /// Identifiers of the features now attached.
        features: Vec<String>,
    },
    /// The record creation time changed.
    CreationTime {
        /// The new creation instant.
        instant: DateTime<Utc>,
    },
    /// The issuance counter changed.
    IssuanceCount {
        /// The new count.
        count: u32,
    },
}

/// Result of merging an earlier modification with a later one.
#[derive(Debug, Clone, PartialEq)]
pub enum ModificationMerge {
    /// The two modifications describe different fields; keep both.
    Incompatible,
    /// The pair collapses into one net modification.
    Combined(Modification),
    /// The pair cancels out entirely (every touched attribute round-tripped
    /// back to its pre-change value).
    CancelledOut,
}

impl Modification {
    /// The field class this modification describes.
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Status { .. } => FieldKind::Status,
            Self::Attributes { .. } => FieldKind::Attributes,
            Self::Geometry { .. } => FieldKind::Geometry,
            Self::TimeRange { .. } => FieldKind::TimeRange,
            Self::HazardType { .. } => FieldKind::HazardType,
            Self::VisualFeatures { .. } => FieldKind::VisualFeatures,
            Self::CreationTime { .. } => FieldKind::CreationTime,
            Self::IssuanceCount { .. } => FieldKind::IssuanceCount,
        }
    }

    /// Merge an earlier modification with a later one of the same event.
    ///
    /// For every variant except [`Modification::Attributes`] the later
    /// value simply wins. Attribute changes merge per key: the later value
    /// wins unless it equals the value the key held before the earlier
    /// modification, in which case the key dropped out entirely -- the
    /// attribute round-tripped and no net change is reported.
    pub fn merge(earlier: &Self, later: &Self) -> ModificationMerge {
        match (earlier, later) {
            (
                Self::Attributes {
                    changes: earlier_changes,
                    previous: earlier_previous,
                },
                Self::Attributes {
                    changes: later_changes,
                    previous: later_previous,
                },
            ) => merge_attributes(
                earlier_changes,
                earlier_previous,
                later_changes,
                later_previous,
            ),
            (Self::Status { .. }, Self::Status { .. })
            | (Self::Geometry { .. }, Self::Geometry { .. })
            | (Self::TimeRange { .. }, Self::TimeRange { .. })
            | (Self::HazardType { .. }, Self::HazardType { .. })
            | (Self::VisualFeatures { .. }, Self::VisualFeatures { .. })
            | (Self::CreationTime { .. }, Self::CreationTime { .. })
            | (Self::IssuanceCount { .. }, Self::IssuanceCount { .. }) => {
                ModificationMerge::Combined(later.clone())
            }
            _ => ModificationMerge::Incompatible,
        }
    }
}

/// Normalize an attribute value for round-trip comparison: a JSON `null`
/// and an absent key both mean "not set".
fn normalize(value: Option<&serde_json::Value>) -> Option<&serde_json::Value> {
    value.filter(|inner| !inner.is_null())
}

/// Per-key merge of two attribute modifications.
fn merge_attributes(
    earlier_changes: &AttributeMap,
    earlier_previous: &PriorValues,
    later_changes: &AttributeMap,
    later_previous: &PriorValues,
) -> ModificationMerge {
    let mut changes = earlier_changes.clone();
    let mut previous = earlier_previous.clone();

    for (key, value) in later_changes {
        // The value the key held before the earlier of the two
        // modifications touched it. If the earlier one never touched it,
        // the later modification's own prior value is the baseline.
        let baseline = earlier_previous
            .get(key)
            .or_else(|| later_previous.get(key))
            .cloned()
            .unwrap_or(None);

        if normalize(baseline.as_ref()) == normalize(Some(value)) {
            // Round trip: the net change for this key is nothing.
            changes.remove(key);
            previous.remove(key);
        } else {
            changes.insert(key.clone(), value.clone());
            previous.entry(key.clone()).or_insert(baseline);
        }
    }

    if changes.is_empty() {
        ModificationMerge::CancelledOut
    } else {
        ModificationMerge::Combined(Modification::Attributes { changes, previous })
    }
}

/// Fold a list of incoming modifications into an existing list.
///
/// Each incoming modification merges with the most recent compatible entry
/// in the accumulated list, replacing it in place (or deleting it when the
/// pair cancels out). Incompatible modifications append.
pub fn merge_modification_lists(
    existing: Vec<Modification>,
    incoming: Vec<Modification>,
) -> Vec<Modification> {
    let mut merged = existing;
    for modification in incoming {
        let position = merged
            .iter()
            .rposition(|candidate| candidate.kind() == modification.kind());
        match position {
            Some(index) => {
                let Some(candidate) = merged.get(index) else {
                    merged.push(modification);
                    continue;
                };
                match Modification::merge(candidate, &modification) {
                    ModificationMerge::Combined(combined) => {
                        if let Some(slot) = merged.get_mut(index) {
                            *slot = combined;
                        }
                    }
                    ModificationMerge::CancelledOut => {
                        merged.remove(index);
                    }
                    ModificationMerge::Incompatible => merged.push(modification),
                }
            }
            None => merged.push(modification),
        }
    }
    merged
}
