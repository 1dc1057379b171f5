//! Error types for the Squall engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the scripted session.

/// Top-level error for the Squall engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {message}")]
    Config {
        /// Description of the configuration failure.
        message: String,
    },

    /// A session operation failed.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: squall_core::SessionError,
    },
}
