//! Typed identifier wrappers for session entities.
//!
//! A hazard event carries two identifiers. The [`RecordId`] is an internal
//! UUID v7 assigned the moment the record is constructed and never shown to
//! forecasters. The [`EventId`] is the public, human-readable identifier
//! produced by the site's id-generation collaborator (e.g. `HZ-OAX-000041`);
//! it is immutable once assigned. Sites themselves are identified by a
//! [`SiteId`] (e.g. `OAX`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an owned string as a typed identifier.
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Return the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return whether the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_uuid_id! {
    /// Internal unique identifier for one event record within a session.
    ///
    /// Distinct from the public [`EventId`]: the record id exists from the
    /// instant a draft is built, while the event id may be assigned later
    /// by the id-generation collaborator.
    RecordId
}

define_string_id! {
    /// Public identifier of a hazard event, assigned by the id generator
    /// and immutable afterwards.
    EventId
}

define_string_id! {
    /// Identifier of the forecast office ("site") that owns the session.
    SiteId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn event_id_display_roundtrip() {
        let id = EventId::from("HZ-OAX-000041");
        assert_eq!(id.to_string(), "HZ-OAX-000041");
        assert_eq!(id.as_str(), "HZ-OAX-000041");
        assert!(!id.is_empty());
    }

    #[test]
    fn event_id_serde_roundtrip() {
        let id = EventId::from("HZ-OAX-000007");
        let json = serde_json::to_string(&id).ok();
        assert!(json.is_some());
        let back: Result<EventId, _> = serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(back.ok(), Some(id));
    }
}
