//! Core session logic for the Squall hazard-event engine.
//!
//! This crate hosts the lifecycle orchestration: the [`SessionManager`]
//! owns the in-memory event collection and routes every mutation through
//! the record guards, the notification queue, the spatio-temporal conflict
//! detector, and the expiration scheduler. All outward dependencies --
//! persistence, id allocation, hatched-area building, the clock, and the
//! user-facing warning channel -- are injected as trait objects.
//!
//! # Modules
//!
//! - [`session`] -- The session manager orchestrator
//! - [`record`] -- Event records and the field mutation guard
//! - [`conflict`] -- Spatio-temporal conflict detection
//! - [`expiration`] -- Expiration wakes against the session clock
//! - [`clock`] -- The simulated session clock
//! - [`config`] -- Typed session and hazard-type configuration
//! - [`store`] -- The persistence collaborator and the in-memory store
//! - [`hatch`] -- Hatched-area resolution (zones, radii, raw polygons)
//! - [`ident`] -- Public-identifier allocation
//! - [`alert`] -- The user-facing warning channel
//! - [`error`] -- The session error type

pub mod alert;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expiration;
pub mod hatch;
pub mod ident;
pub mod record;
pub mod session;
pub mod store;

pub use alert::{AlertChannel, LogAlertChannel};
pub use clock::{ChangeListener, ListenerToken, SessionClock, SimulatedClock};
pub use config::{
    DisplaySettings, HatchSpec, HazardTypeConfig, HazardTypeTable, SessionConfig,
};
pub use conflict::ConflictDetector;
pub use error::SessionError;
pub use expiration::ExpirationScheduler;
pub use hatch::{HatchCell, HatchError, HatchResolver, HatchedArea, NamedZone, ZoneTableResolver};
pub use ident::{IdError, IdGenerator, SiteSequenceIds};
pub use record::{DraftEvent, EventRecord, RecordParams, RecordSource};
pub use session::{SessionManager, SessionParams, TransitionOutcome};
pub use store::{EventStore, HistoryList, MemoryStore, StoreError, StoreFilter};
