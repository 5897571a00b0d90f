//! Error types for the demo binary.
//!
//! [`DemoError`] is the top-level error type that wraps all possible
//! failure modes during demo startup and the run itself.

/// Top-level error for the demo binary.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// The scenario section could not be read or parsed.
    #[error("scenario error: {message}")]
    Scenario {
        /// Description of the scenario failure.
        message: String,
    },

    /// The schedule could not be assembled.
    #[error("schedule error: {source}")]
    Schedule {
        /// The underlying scheduler error.
        #[from]
        source: cadence_core::error::SchedulerError,
    },

    /// The simulation loop aborted.
    #[error("run error: {source}")]
    Run {
        /// The underlying run error.
        #[from]
        source: cadence_core::runner::RunError,
    },

    /// Output directory or file handling failed.
    #[error("output error: {source}")]
    Output {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// The blocking simulation task could not be joined.
    #[error("simulation task failed: {message}")]
    Join {
        /// Description of the join failure.
        message: String,
    },
}
