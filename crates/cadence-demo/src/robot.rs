//! Stub legged robot and its locomotion driver.
//!
//! The robot is a point-mass chassis: held fixed while posing, released
//! onto terrain when the terrain is created, and pushed forward at the
//! driver's nominal speed once locomotion starts. It exists so the demo
//! has an engine to step; nothing here models real contact dynamics.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_core::collaborator::{CollaboratorError, PhysicsStepper};
use cadence_types::{LocomotionMode, PhaseTransition};
use serde::Serialize;
use tracing::{debug, info};

/// Gravitational acceleration (m/s^2).
const GRAVITY: f64 = 9.8;

/// Distance between the posed wheels and the terrain surface when it is
/// created under the robot (m).
const DROP_HEIGHT: f64 = 0.15;

/// Name of the phase in which the driver runs its gait cycle.
pub const LOCOMOTE_PHASE: &str = "locomote";

/// Mutable robot state shared between the stepper, actions and the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotState {
    /// Simulation time seen by the engine.
    pub time: f64,
    /// Phase the scheduler last reported.
    pub phase: String,
    /// Forward chassis position (m).
    pub chassis_x: f64,
    /// Vertical chassis position (m).
    pub chassis_z: f64,
    /// Vertical chassis velocity (m/s).
    pub vertical_speed: f64,
    /// Commanded forward speed (m/s).
    pub forward_speed: f64,
    /// Whether the chassis is held in place.
    pub fixed: bool,
    /// Terrain surface height, once terrain exists.
    pub terrain_z: Option<f64>,
}

impl RobotState {
    /// A robot held in its initial pose, with no terrain underneath.
    pub fn posed(initial_phase: &str) -> Self {
        Self {
            time: 0.0,
            phase: initial_phase.to_owned(),
            chassis_x: 0.0,
            chassis_z: 0.0,
            vertical_speed: 0.0,
            forward_speed: 0.0,
            fixed: true,
            terrain_z: None,
        }
    }

    /// Place terrain just below the robot and release the chassis.
    pub fn create_terrain(&mut self) {
        let surface = self.chassis_z - DROP_HEIGHT;
        self.terrain_z = Some(surface);
        self.fixed = false;
        info!(time = self.time, terrain_z = surface, "Terrain created, chassis released");
    }

    /// Whether the chassis is resting on terrain.
    pub fn is_grounded(&self) -> bool {
        self.terrain_z.is_some_and(|z| self.chassis_z <= z)
    }
}

/// Shared handle to the robot state.
pub type SharedRobot = Rc<RefCell<RobotState>>;

/// The stub engine: integrates the chassis one step at a time.
#[derive(Debug)]
pub struct DemoRobot {
    state: SharedRobot,
}

impl DemoRobot {
    /// Create an engine stepping `state`.
    pub const fn new(state: SharedRobot) -> Self {
        Self { state }
    }
}

impl PhysicsStepper for DemoRobot {
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError> {
        let mut state = self.state.borrow_mut();
        state.time += step_size;
        if state.fixed {
            return Ok(());
        }

        if !state.is_grounded() {
            state.vertical_speed -= GRAVITY * step_size;
            state.chassis_z += state.vertical_speed * step_size;
        }
        if let Some(surface) = state.terrain_z.filter(|&z| state.chassis_z <= z) {
            state.chassis_z = surface;
            state.vertical_speed = 0.0;
            state.chassis_x += state.forward_speed * step_size;
        }

        if !state.chassis_z.is_finite() {
            return Err(CollaboratorError::new(format!(
                "chassis height diverged at t={}",
                state.time
            )));
        }
        Ok(())
    }
}

/// Actuation files and nominal speed of one locomotion mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverProfile {
    /// The mode this profile drives.
    pub mode: LocomotionMode,
    /// Actuation played once before the cycle, if any.
    pub start_file: Option<&'static str>,
    /// Actuation repeated while locomoting.
    pub cycle_file: &'static str,
    /// Actuation played when stopping, if any.
    pub stop_file: Option<&'static str>,
    /// Nominal forward speed of the gait (m/s).
    pub nominal_speed: f64,
}

impl DriverProfile {
    /// Resolve the profile for `mode`.
    pub const fn for_mode(mode: LocomotionMode) -> Self {
        match mode {
            LocomotionMode::Walk => Self {
                mode,
                start_file: None,
                cycle_file: "actuation/walking_cycle.txt",
                stop_file: None,
                nominal_speed: 0.25,
            },
            LocomotionMode::Scull => Self {
                mode,
                start_file: Some("actuation/sculling_start.txt"),
                cycle_file: "actuation/sculling_cycle2.txt",
                stop_file: Some("actuation/sculling_stop.txt"),
                nominal_speed: 0.15,
            },
            LocomotionMode::Inchworm => Self {
                mode,
                start_file: Some("actuation/inchworming_start.txt"),
                cycle_file: "actuation/inchworming_cycle.txt",
                stop_file: Some("actuation/inchworming_stop.txt"),
                nominal_speed: 0.08,
            },
            LocomotionMode::Drive => Self {
                mode,
                start_file: Some("actuation/driving_start.txt"),
                cycle_file: "actuation/driving_cycle.txt",
                stop_file: Some("actuation/driving_stop.txt"),
                nominal_speed: 0.6,
            },
        }
    }
}

/// Drives the robot's gait and tracks its average speed.
///
/// Subscribed to phase transitions: it keeps the robot's phase label
/// current and starts the gait cycle on entering [`LOCOMOTE_PHASE`].
#[derive(Debug)]
pub struct LocomotionDriver {
    profile: DriverProfile,
    robot: SharedRobot,
    started: Option<(f64, f64)>,
}

impl LocomotionDriver {
    /// Create a driver for `robot` using `profile`.
    pub const fn new(profile: DriverProfile, robot: SharedRobot) -> Self {
        Self {
            profile,
            robot,
            started: None,
        }
    }

    /// React to a phase boundary crossing.
    pub fn on_phase_change(&mut self, transition: &PhaseTransition) {
        let mut robot = self.robot.borrow_mut();
        robot.phase.clone_from(&transition.to_name);
        debug!(
            from = transition.from_name,
            to = transition.to_name,
            elapsed = transition.elapsed,
            "Driver observed phase change"
        );

        if transition.to_name == LOCOMOTE_PHASE && self.started.is_none() {
            robot.forward_speed = self.profile.nominal_speed;
            self.started = Some((transition.elapsed, robot.chassis_x));
            info!(
                mode = %self.profile.mode,
                start = self.profile.start_file,
                cycle = self.profile.cycle_file,
                speed = self.profile.nominal_speed,
                "Locomotion started"
            );
        }
    }

    /// Average forward speed since locomotion started, if it has.
    pub fn avg_speed(&self) -> Option<f64> {
        let (t0, x0) = self.started?;
        let robot = self.robot.borrow();
        let elapsed = robot.time - t0;
        if elapsed <= 0.0 {
            return None;
        }
        Some((robot.chassis_x - x0) / elapsed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn shared(phase: &str) -> SharedRobot {
        Rc::new(RefCell::new(RobotState::posed(phase)))
    }

    #[test]
    fn posed_robot_does_not_move() {
        let robot = shared("pose");
        let mut engine = DemoRobot::new(Rc::clone(&robot));
        for _ in 0..100 {
            engine.advance(0.01).unwrap();
        }
        let state = robot.borrow();
        assert!((state.time - 1.0).abs() < 1e-9);
        assert!(state.chassis_z.abs() < f64::EPSILON);
        assert!(state.fixed);
    }

    #[test]
    fn released_robot_lands_on_terrain() {
        let robot = shared("settle");
        robot.borrow_mut().create_terrain();
        let mut engine = DemoRobot::new(Rc::clone(&robot));
        for _ in 0..500 {
            engine.advance(1e-3).unwrap();
        }
        let state = robot.borrow();
        assert!(state.is_grounded());
        assert!((state.chassis_z + DROP_HEIGHT).abs() < 1e-9);
        assert!(state.vertical_speed.abs() < f64::EPSILON);
    }

    #[test]
    fn every_mode_resolves_a_profile() {
        for mode in [
            LocomotionMode::Walk,
            LocomotionMode::Scull,
            LocomotionMode::Inchworm,
            LocomotionMode::Drive,
        ] {
            let profile = DriverProfile::for_mode(mode);
            assert_eq!(profile.mode, mode);
            assert!(profile.nominal_speed > 0.0);
        }
        assert!(DriverProfile::for_mode(LocomotionMode::Walk).start_file.is_none());
    }

    #[test]
    fn driver_starts_gait_on_locomote() {
        let robot = shared("settle");
        robot.borrow_mut().create_terrain();
        let mut driver =
            LocomotionDriver::new(DriverProfile::for_mode(LocomotionMode::Drive), Rc::clone(&robot));
        let mut engine = DemoRobot::new(Rc::clone(&robot));
        for _ in 0..500 {
            engine.advance(1e-3).unwrap();
        }
        assert_eq!(driver.avg_speed(), None);

        let now = robot.borrow().time;
        driver.on_phase_change(&PhaseTransition {
            from_index: 1,
            from_name: "settle".to_owned(),
            to_index: 2,
            to_name: LOCOMOTE_PHASE.to_owned(),
            elapsed: now,
        });
        assert_eq!(robot.borrow().phase, LOCOMOTE_PHASE);

        for _ in 0..1_000 {
            engine.advance(1e-3).unwrap();
        }
        let speed = driver.avg_speed().unwrap();
        assert!((speed - 0.6).abs() < 1e-6);
    }
}
