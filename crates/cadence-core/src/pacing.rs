//! Real-time pacing decorator.
//!
//! The scheduler itself has no notion of wall-clock time. When a run should
//! play out in real time (interactive viewers, hardware-in-the-loop, pub/sub
//! consumers expecting live rates), wrap the physics stepper in a
//! [`RealtimePacer`]: after each step it sleeps until wall-clock time has
//! caught up with simulated time. If the engine is slower than real time the
//! pacer never sleeps and the run simply lags.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::collaborator::{CollaboratorError, PhysicsStepper};

/// Wraps a [`PhysicsStepper`] so simulated time never runs ahead of
/// wall-clock time.
#[derive(Debug)]
pub struct RealtimePacer<S> {
    inner: S,
    started: Option<Instant>,
    simulated: f64,
    slept: Duration,
}

impl<S> RealtimePacer<S> {
    /// Wrap `inner`. The wall clock starts on the first step.
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            started: None,
            simulated: 0.0,
            slept: Duration::ZERO,
        }
    }

    /// Access the wrapped stepper.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Mutable access to the wrapped stepper.
    pub const fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap into the inner stepper.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Total time spent sleeping so far.
    pub const fn slept(&self) -> Duration {
        self.slept
    }
}

impl<S: PhysicsStepper> PhysicsStepper for RealtimePacer<S> {
    fn advance(&mut self, step_size: f64) -> Result<(), CollaboratorError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.inner.advance(step_size)?;
        self.simulated += step_size;

        let Ok(target) = Duration::try_from_secs_f64(self.simulated) else {
            return Ok(());
        };
        if let Some(ahead) = target.checked_sub(started.elapsed()) {
            self.slept = self.slept.saturating_add(ahead);
            std::thread::sleep(ahead);
        } else {
            debug!(simulated = self.simulated, "running behind real time");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collaborator::RecordingStepper;

    #[test]
    fn pacer_keeps_simulation_behind_wall_clock() {
        let mut pacer = RealtimePacer::new(RecordingStepper::new());
        let start = Instant::now();
        for _ in 0..5 {
            pacer.advance(0.01).unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(45));
        assert_eq!(pacer.inner().steps(), 5);
    }

    #[test]
    fn pacer_propagates_inner_failure() {
        let mut pacer = RealtimePacer::new(RecordingStepper::failing_on(1));
        assert!(pacer.advance(0.01).is_err());
        assert_eq!(pacer.slept(), Duration::ZERO);
    }
}
