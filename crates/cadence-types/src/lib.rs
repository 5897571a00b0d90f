//! Shared type definitions for the Cadence phased simulation scheduler.
//!
//! # Modules
//!
//! - [`ids`] -- Registry handles and run identifiers
//! - [`enums`] -- Run end reasons and locomotion modes
//! - [`records`] -- Phase transitions, task counts and tick messages

pub mod enums;
pub mod ids;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use enums::{LocomotionMode, RunEndReason};
pub use ids::{EventId, RunId, TaskId};
pub use records::{PhaseTransition, TaskFireCount, TickMessage};
