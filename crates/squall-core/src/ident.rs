//! The id-generation collaborator.
//!
//! Public event identifiers come from an injectable generator so that a
//! deployment can plug in its office-wide allocation service. A failure to
//! produce an identifier is fatal to the enclosing `add_event` call.

use std::sync::atomic::{AtomicU64, Ordering};

use squall_types::{EventId, SiteId};

/// Errors surfaced by an id generator.
#[derive(Debug, thiserror::Error)]
#[error("id generation failed: {reason}")]
pub struct IdError {
    /// Description of the failure.
    pub reason: String,
}

/// The id-generation collaborator.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh, unique public identifier for the given site.
    fn generate_id(&self, site: &SiteId) -> Result<EventId, IdError>;
}

/// Serial-number generator producing `HZ-<site>-<serial>` identifiers.
#[derive(Debug, Default)]
pub struct SiteSequenceIds {
    next_serial: AtomicU64,
}

impl SiteSequenceIds {
    /// Create a generator starting at serial 1.
    pub const fn new() -> Self {
        Self {
            next_serial: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SiteSequenceIds {
    fn generate_id(&self, site: &SiteId) -> Result<EventId, IdError> {
        if site.is_empty() {
            return Err(IdError {
                reason: "site identifier is empty".to_owned(),
            });
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        Ok(EventId::from(format!("HZ-{site}-{serial:06}").as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serials_increase() {
        let generator = SiteSequenceIds::new();
        let site = SiteId::from("OAX");
        let first = generator.generate_id(&site).unwrap();
        let second = generator.generate_id(&site).unwrap();
        assert_eq!(first.as_str(), "HZ-OAX-000001");
        assert_eq!(second.as_str(), "HZ-OAX-000002");
    }

    #[test]
    fn empty_site_fails() {
        let generator = SiteSequenceIds::new();
        assert!(generator.generate_id(&SiteId::default()).is_err());
    }
}
