//! External collaborators driven by the simulation loop.
//!
//! The loop never integrates dynamics or draws anything itself. It calls a
//! [`PhysicsStepper`] once per step and, if one is attached, a [`Renderer`]
//! once per iteration. Either may fail; the loop treats any failure as
//! fatal and does not retry.
//!
//! [`RecordingStepper`] and [`CountingRenderer`] stand in for a real engine
//! and window, so the loop can be exercised end-to-end without one.

/// Failure reported by a physics or render collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CollaboratorError {
    /// Description of the failure.
    pub message: String,
}

impl CollaboratorError {
    /// Create an error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An engine that can advance its world by one fixed step.
pub trait PhysicsStepper {
    /// Integrate the world forward by `step_size` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the engine cannot complete the step
    /// (solver divergence, lost device, etc.).
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError>;
}

impl<S: PhysicsStepper + ?Sized> PhysicsStepper for &mut S {
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError> {
        (**self).advance(step_size)
    }
}

impl<S: PhysicsStepper + ?Sized> PhysicsStepper for Box<S> {
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError> {
        (**self).advance(step_size)
    }
}

/// Adapts a closure into a [`PhysicsStepper`].
pub struct FnStepper<F>(pub F);

impl<F> PhysicsStepper for FnStepper<F>
where
    F: FnMut(f64) -> Result<(), CollaboratorError>,
{
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError> {
        (self.0)(step_size)
    }
}

/// A frame presenter. Headless runs simply attach none.
pub trait Renderer {
    /// Prepare a new frame.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the frame cannot be started.
    fn begin_frame(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }

    /// Draw the current world state.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if drawing fails.
    fn render(&mut self) -> Result<(), CollaboratorError>;

    /// Present the finished frame.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if presenting fails.
    fn end_frame(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// A stub engine that records how far it has been stepped.
///
/// Optionally fails on a chosen step to exercise collaborator-failure
/// handling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingStepper {
    steps: u64,
    simulated_time: f64,
    fail_on_step: Option<u64>,
}

impl RecordingStepper {
    /// Create a stepper that never fails.
    pub const fn new() -> Self {
        Self {
            steps: 0,
            simulated_time: 0.0,
            fail_on_step: None,
        }
    }

    /// Create a stepper whose `step`-th call (1-based) fails.
    pub const fn failing_on(step: u64) -> Self {
        Self {
            steps: 0,
            simulated_time: 0.0,
            fail_on_step: Some(step),
        }
    }

    /// Number of successful steps taken.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Sum of all step sizes successfully applied.
    pub const fn simulated_time(&self) -> f64 {
        self.simulated_time
    }
}

impl PhysicsStepper for RecordingStepper {
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError> {
        let attempt = self.steps.saturating_add(1);
        if self.fail_on_step == Some(attempt) {
            return Err(CollaboratorError::new(format!(
                "solver diverged on step {attempt}"
            )));
        }
        self.steps = attempt;
        self.simulated_time += step_size;
        Ok(())
    }
}

/// A stub renderer counting begin/render/end calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountingRenderer {
    /// Number of `begin_frame` calls.
    pub begun: u64,
    /// Number of `render` calls.
    pub rendered: u64,
    /// Number of `end_frame` calls.
    pub ended: u64,
}

impl Renderer for CountingRenderer {
    fn begin_frame(&mut self) -> Result<(), CollaboratorError> {
        self.begun = self.begun.saturating_add(1);
        Ok(())
    }

    fn render(&mut self) -> Result<(), CollaboratorError> {
        self.rendered = self.rendered.saturating_add(1);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), CollaboratorError> {
        self.ended = self.ended.saturating_add(1);
        Ok(())
    }
}
