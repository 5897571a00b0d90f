//! Configuration errors raised while setting up a schedule.
//!
//! Every variant is raised synchronously at registration or construction
//! time. Nothing in this enum is produced while the loop is running.

use crate::clock::ClockError;

/// Errors raised while configuring the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The clock could not be created.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// Periodic task frequency is zero, negative, or not finite.
    #[error("invalid frequency {frequency_hz} Hz: must be finite and greater than zero")]
    InvalidFrequency {
        /// The rejected frequency.
        frequency_hz: f64,
    },

    /// The step interval derived from a frequency does not fit in a `u64`.
    #[error("frequency {frequency_hz} Hz is too low for step size {step_size}")]
    IntervalOverflow {
        /// The requested frequency.
        frequency_hz: f64,
        /// The clock's step size.
        step_size: f64,
    },

    /// Timed event trigger time is negative or not finite.
    #[error("invalid trigger time {trigger_time}: must be finite and non-negative")]
    InvalidTime {
        /// The rejected trigger time.
        trigger_time: f64,
    },

    /// End time is zero, negative, or not finite.
    #[error("invalid end time {end_time}: must be finite and greater than zero")]
    InvalidEndTime {
        /// The rejected end time.
        end_time: f64,
    },

    /// A phase duration is negative or not finite.
    #[error("phase '{phase}' has invalid duration {duration}")]
    InvalidPhaseDuration {
        /// Name of the offending phase.
        phase: String,
        /// The rejected duration.
        duration: f64,
    },

    /// An unbounded phase appears before the end of the sequence.
    #[error("phase '{phase}' is unbounded but is not the last phase")]
    UnboundedPhaseNotLast {
        /// Name of the offending phase.
        phase: String,
    },

    /// Two phases share a name.
    #[error("duplicate phase name '{phase}'")]
    DuplicatePhase {
        /// The repeated name.
        phase: String,
    },

    /// A phase was configured with an empty name.
    #[error("phase names must not be empty")]
    EmptyPhaseName,

    /// A hook referenced a phase that is not configured.
    #[error("unknown phase '{phase}'")]
    UnknownPhase {
        /// The name that did not resolve.
        phase: String,
    },
}
