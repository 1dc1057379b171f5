//! Error types for the session core.
//!
//! Illegal status transitions are deliberately *not* errors -- they are
//! no-op outcomes (see `TransitionOutcome` in the session module). Errors
//! here are conditions the caller must handle: a rejected locked-field
//! mutation, a duplicate or unknown event, or a failed collaborator.

use squall_types::{EventId, FieldKind};

use crate::hatch::HatchError;
use crate::store::StoreError;

/// Errors surfaced by the session core.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A caller attempted to change a locked field on an issued event.
    /// Propagates synchronously; never swallowed.
    #[error("illegal modification of {field} on an issued event")]
    IllegalModification {
        /// The field class that was rejected.
        field: FieldKind,
    },

    /// `add_event` was called with an identifier the session already
    /// manages; merging requires the explicit merge operation.
    #[error("event already managed: {0}")]
    DuplicateEvent(EventId),

    /// The referenced event is not in the session collection.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// The id-generation collaborator could not produce an identifier.
    /// Fatal to the enclosing `add_event` call; no partial event remains.
    #[error("id generation failed for site {site}: {reason}")]
    IdGeneration {
        /// The site an id was requested for.
        site: String,
        /// Description of the failure.
        reason: String,
    },

    /// The event's hazard type does not permit an until-further-notice
    /// end time.
    #[error("until further notice is not allowed for event {0}")]
    UntilFurtherNoticeDisallowed(EventId),

    /// A geometry carries more exterior points than the hazard type's
    /// configured limit.
    #[error("geometry for event {event} exceeds the {limit}-point limit")]
    PointLimitExceeded {
        /// The event whose geometry was rejected.
        event: EventId,
        /// The configured exterior-point limit.
        limit: usize,
    },

    /// A persistence-store operation failed outside the catch-and-log
    /// status-persist path.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The hatch-area collaborator failed to build a hatched area.
    #[error(transparent)]
    Hatch(#[from] HatchError),
}
