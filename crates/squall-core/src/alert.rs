//! The user-facing warning channel.
//!
//! One-shot fatal-condition notifications -- e.g. a geometry reduction that
//! left an empty result -- go to the forecaster through this collaborator
//! rather than disappearing into the log. The default implementation logs
//! at error severity; a UI embeds its own channel.

use tracing::error;

/// The user-facing warning channel collaborator.
pub trait AlertChannel: Send + Sync {
    /// Report a fatal condition the forecaster must see once.
    fn fatal(&self, message: &str);
}

/// Default channel that logs fatal conditions at error severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertChannel;

impl AlertChannel for LogAlertChannel {
    fn fatal(&self, message: &str) {
        error!(message, "fatal session condition");
    }
}
