//! Shared type definitions for the Squall hazard-event session.
//!
//! This crate is the single source of truth for the value types used across
//! the Squall workspace: typed identifiers, the lifecycle status machine,
//! the hazard type triple, event time ranges, geometry with topological
//! equality, and the attribute/conflict map aliases.
//!
//! # Modules
//!
//! - [`ids`] -- Typed identifier wrappers (record, event, site)
//! - [`enums`] -- Status state machine, originator, field kinds, product class
//! - [`structs`] -- Hazard type, time range, attribute and conflict maps
//! - [`geometry`] -- Geometry wrapper with the session's equality semantics

pub mod enums;
pub mod geometry;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{FieldKind, Originator, ProductClass, Status};
pub use geometry::EventGeometry;
pub use ids::{EventId, RecordId, SiteId};
pub use structs::{
    ATTR_CHECKED, ATTR_ISSUED, ATTR_SELECTED, AttributeMap, ConflictEntries, ConflictMap,
    HazardType, PROTECTED_ATTRIBUTES, TimeRange, minute_floor,
};
