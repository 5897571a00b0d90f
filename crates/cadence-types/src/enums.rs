//! Enumeration types shared by the scheduler core and its embedders.

use serde::{Deserialize, Serialize};

/// Reason a simulation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEndReason {
    /// Simulation time reached the configured end time.
    EndTimeReached,
    /// The external liveness signal reported false (e.g. window closed).
    LivenessLost,
    /// A stop was requested through a stop handle.
    StopRequested,
    /// The configured step bound was reached.
    MaxStepsReached,
}

/// Locomotion mode of a legged robot driver.
///
/// Resolved once before the run starts into a driver profile; the loop
/// itself never branches on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocomotionMode {
    /// Quadruped walking gait.
    #[default]
    Walk,
    /// Sculling gait (limbs sweep while wheels stay grounded).
    Scull,
    /// Inchworm gait.
    Inchworm,
    /// Driving on wheels.
    Drive,
}

impl LocomotionMode {
    /// Return the lowercase name used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Scull => "scull",
            Self::Inchworm => "inchworm",
            Self::Drive => "drive",
        }
    }
}

impl core::fmt::Display for LocomotionMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn locomotion_mode_uses_lowercase_names() {
        let mode: LocomotionMode = serde_json::from_str("\"inchworm\"").unwrap();
        assert_eq!(mode, LocomotionMode::Inchworm);
        assert_eq!(mode.to_string(), "inchworm");
    }

    #[test]
    fn end_reason_serializes_snake_case() {
        let json = serde_json::to_string(&RunEndReason::MaxStepsReached).unwrap();
        assert_eq!(json, "\"max_steps_reached\"");
    }
}
