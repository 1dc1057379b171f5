//! Enumeration types for the hazard-event session.
//!
//! Covers the lifecycle status state machine, the change originator used for
//! notification-merge eligibility, the guarded field kinds, and the product
//! class of the session.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lifecycle status
// ---------------------------------------------------------------------------

/// Lifecycle status of a hazard event.
///
/// The legal transitions form a small directed graph:
///
/// ```text
/// Potential -> Pending -> Proposed -> Issued -> Ended
///                    \_____________/^   ^______/
///     Potential -> Proposed            (Ended -> Issued, clock-driven)
/// ```
///
/// Any transition outside [`Status::can_transition`] is treated as a no-op
/// by the session, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// A possible hazard under consideration; not yet part of the workflow.
    Potential,
    /// A hazard being prepared but not yet shared for review.
    Pending,
    /// A hazard shared for review, awaiting issuance.
    Proposed,
    /// An issued, publicly active hazard.
    Issued,
    /// A hazard whose active period is over.
    Ended,
}

impl Status {
    /// Return whether a direct transition from `self` to `target` is legal.
    ///
    /// The `Ended -> Issued` edge exists solely for the simulated-clock
    /// rewind protocol; callers other than the expiration machinery should
    /// never request it.
    pub fn can_transition(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Potential, Self::Pending | Self::Proposed)
                | (Self::Pending, Self::Proposed | Self::Issued)
                | (Self::Proposed, Self::Issued)
                | (Self::Issued, Self::Ended)
                | (Self::Ended, Self::Issued)
        )
    }

    /// Return whether the event is past the point where type, time, and
    /// geometry changes become subject to per-hazard-type locking.
    pub const fn is_issued_or_later(self) -> bool {
        matches!(self, Self::Issued | Self::Ended)
    }
}

// ---------------------------------------------------------------------------
// Originator
// ---------------------------------------------------------------------------

/// The actor attributed as the source of a change.
///
/// Two notifications are only ever merged when they share an originator, so
/// interleaved user and automation activity never collapses into one
/// misattributed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Originator {
    /// An interactive forecaster action.
    User,
    /// Session-internal automation (e.g. the expiration scheduler).
    Automation,
    /// A change synchronized from a remote workstation.
    Remote,
}

// ---------------------------------------------------------------------------
// Guarded field kinds
// ---------------------------------------------------------------------------

/// The field classes the mutation guard protects.
///
/// Carried by `IllegalModification` errors so the caller knows which field
/// was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// The lifecycle status.
    Status,
    /// An entry in the attribute map.
    Attributes,
    /// The event geometry.
    Geometry,
    /// The start/end time range.
    TimeRange,
    /// The (phenomenon, significance, subtype) triple.
    HazardType,
    /// The set of attached visual features.
    VisualFeatures,
    /// The record creation time.
    CreationTime,
    /// The number of times the event has been issued.
    IssuanceCount,
}

impl core::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Status => "status",
            Self::Attributes => "attributes",
            Self::Geometry => "geometry",
            Self::TimeRange => "time_range",
            Self::HazardType => "hazard_type",
            Self::VisualFeatures => "visual_features",
            Self::CreationTime => "creation_time",
            Self::IssuanceCount => "issuance_count",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Product class
// ---------------------------------------------------------------------------

/// The operating mode of the session, stamped onto newly added events.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProductClass {
    /// Live operational products.
    #[default]
    Operational,
    /// Forecaster training with simulated time.
    Practice,
    /// System test products, never public.
    Test,
}
