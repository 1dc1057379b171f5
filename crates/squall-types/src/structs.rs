//! Core value types for the hazard-event session.
//!
//! Covers the hazard type triple, the event time range with its
//! until-further-notice sentinel, the attribute map, and the derived
//! conflict map.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;

// ---------------------------------------------------------------------------
// Attribute map
// ---------------------------------------------------------------------------

/// The free-form attribute map of a hazard event.
///
/// Keys are attribute names; values are arbitrary serializable JSON.
/// Insertion order is irrelevant, so a sorted map keeps equality and
/// serialization deterministic.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// Protected bookkeeping attribute: whether the event is selected.
pub const ATTR_SELECTED: &str = "selected";

/// Protected bookkeeping attribute: whether the event is checked.
pub const ATTR_CHECKED: &str = "checked";

/// Protected bookkeeping attribute: whether the event has ever been issued.
pub const ATTR_ISSUED: &str = "issued";

/// The three bookkeeping attributes preserved across event merges.
pub const PROTECTED_ATTRIBUTES: [&str; 3] = [ATTR_SELECTED, ATTR_CHECKED, ATTR_ISSUED];

// ---------------------------------------------------------------------------
// Conflict map
// ---------------------------------------------------------------------------

/// The set of events conflicting with one event, each with the list of
/// named areas where the conflict occurs (empty when no side uses named
/// zones).
pub type ConflictEntries = BTreeMap<EventId, Vec<String>>;

/// Derived map from event identifier to its conflicting events.
///
/// Recomputed from scratch on relevant notifications, compared by value,
/// never persisted.
pub type ConflictMap = BTreeMap<EventId, ConflictEntries>;

// ---------------------------------------------------------------------------
// Hazard type
// ---------------------------------------------------------------------------

/// The (phenomenon, significance, subtype) triple classifying a hazard.
///
/// An event either has a complete triple or none at all; the record stores
/// `Option<HazardType>` so the compiler rules out partial assignment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HazardType {
    /// Phenomenon code, e.g. `FF` (flash flood) or `TO` (tornado).
    pub phenomenon: String,
    /// Significance code, e.g. `W` (warning) or `A` (watch).
    pub significance: String,
    /// Optional refinement of the phenomenon, e.g. `Convective`.
    pub subtype: Option<String>,
}

impl HazardType {
    /// Create a hazard type with no subtype.
    pub fn new(phenomenon: &str, significance: &str) -> Self {
        Self {
            phenomenon: phenomenon.to_owned(),
            significance: significance.to_owned(),
            subtype: None,
        }
    }

    /// Create a hazard type with a subtype.
    pub fn with_subtype(phenomenon: &str, significance: &str, subtype: &str) -> Self {
        Self {
            phenomenon: phenomenon.to_owned(),
            significance: significance.to_owned(),
            subtype: Some(subtype.to_owned()),
        }
    }

    /// The `phenomenon.significance` key used to look the type up in the
    /// hazard-type configuration table.
    pub fn type_key(&self) -> String {
        format!("{}.{}", self.phenomenon, self.significance)
    }
}

impl core::fmt::Display for HazardType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.subtype {
            Some(subtype) => {
                write!(f, "{}.{}.{}", self.phenomenon, self.significance, subtype)
            }
            None => write!(f, "{}.{}", self.phenomenon, self.significance),
        }
    }
}

// ---------------------------------------------------------------------------
// Time range
// ---------------------------------------------------------------------------

/// Unix timestamp of the until-further-notice sentinel end time
/// (9999-12-31T00:00:00Z).
const UNTIL_FURTHER_NOTICE_SECS: i64 = 253_402_214_400;

/// The `[start, end)` validity interval of a hazard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start instant.
    pub start: DateTime<Utc>,
    /// Exclusive end instant.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a time range from start and end instants.
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The sentinel end instant meaning "no fixed expiration".
    ///
    /// A fixed far-future timestamp rather than `DateTime::MAX_UTC` so the
    /// value survives serialization in every backend.
    pub fn until_further_notice() -> DateTime<Utc> {
        DateTime::from_timestamp(UNTIL_FURTHER_NOTICE_SECS, 0)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Return whether this range ends at the until-further-notice sentinel.
    pub fn has_until_further_notice(&self) -> bool {
        self.end == Self::until_further_notice()
    }

    /// Half-open overlap test: `[10:00, 11:00)` and `[11:00, 12:00)` do
    /// not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl core::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.has_until_further_notice() {
            write!(f, "[{}, until further notice)", self.start)
        } else {
            write!(f, "[{}, {})", self.start, self.end)
        }
    }
}

/// Truncate an instant down to the start of its containing minute.
///
/// Timer wake times and default start times are minute-aligned.
pub fn minute_floor(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}
