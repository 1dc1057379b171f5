//! Change notifications for the Squall hazard-event session.
//!
//! Every permitted mutation of a hazard event produces a typed
//! [`Modification`]; the session packages modifications into
//! [`Notification`] values, runs them through the merge algebra in the
//! pending [`NotificationQueue`], and delivers the survivors through the
//! priority-ordered [`NotificationBus`].
//!
//! # Modules
//!
//! - [`modification`] -- Field-level change descriptions and sub-merge rules
//! - [`notification`] -- Notification sum type and the merge algebra
//! - [`queue`] -- Merge-against-tail pending queue
//! - [`bus`] -- Typed, priority-ordered dispatch to consumers

pub mod bus;
pub mod modification;
pub mod notification;
pub mod queue;

pub use bus::{NotificationBus, Priority, SubscriberToken};
pub use modification::{Modification, ModificationMerge, PriorValues, merge_modification_lists};
pub use notification::{MergeOutcome, Notification, NotificationKind, merge};
pub use queue::NotificationQueue;
