//! Error types for the simulator binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and the run itself.

/// Top-level error for the simulator binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: simnet_core::config::ConfigError,
    },

    /// The journal could not be created.
    #[error("journal error: {source}")]
    Journal {
        /// The underlying journal error.
        #[from]
        source: simnet_events::JournalError,
    },

    /// The topology driver failed.
    #[error("driver error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: simnet_core::driver::DriverError,
    },

    /// A background task panicked or was cancelled.
    #[error("task error: {source}")]
    Task {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
