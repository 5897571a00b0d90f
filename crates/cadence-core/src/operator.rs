//! Run termination: end time, step bound, liveness signal, stop requests.
//!
//! The loop polls its [`Termination`] once at the top of every iteration.
//! There is no mid-step cancellation. A [`StopHandle`] is a cloneable flag
//! that another thread (a Ctrl-C handler, a pub/sub bridge that lost its
//! connection) can raise to end the run at the next iteration boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cadence_types::RunEndReason;

use crate::clock::Clock;
use crate::error::SchedulerError;

/// Cloneable, thread-safe stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stop_requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Create a handle with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a clean stop at the next iteration boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// Polled predicate reporting whether the run should keep going (e.g.
/// "is the display window still open").
pub type LivenessSignal = Box<dyn FnMut() -> bool>;

/// Conditions under which the loop stops. The first satisfied wins.
///
/// With nothing configured the loop runs until the process is stopped.
#[derive(Default)]
pub struct Termination {
    end_time: Option<f64>,
    max_steps: Option<u64>,
    liveness: Option<LivenessSignal>,
    stop: Option<StopHandle>,
}

impl Termination {
    /// A termination with no conditions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop once elapsed time reaches `end_time`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidEndTime`] unless `end_time` is
    /// finite and positive.
    pub fn at(end_time: f64) -> Result<Self, SchedulerError> {
        Self::new().with_end_time(end_time)
    }

    /// Add an end time.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidEndTime`] unless `end_time` is
    /// finite and positive.
    pub fn with_end_time(mut self, end_time: f64) -> Result<Self, SchedulerError> {
        if !end_time.is_finite() || end_time <= 0.0 {
            return Err(SchedulerError::InvalidEndTime { end_time });
        }
        self.end_time = Some(end_time);
        Ok(self)
    }

    /// Add a step bound. Zero means unbounded.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = if max_steps == 0 { None } else { Some(max_steps) };
        self
    }

    /// Keep running only while `signal` returns `true`.
    #[must_use]
    pub fn while_alive<F>(mut self, signal: F) -> Self
    where
        F: FnMut() -> bool + 'static,
    {
        self.liveness = Some(Box::new(signal));
        self
    }

    /// Stop when `handle` is raised.
    #[must_use]
    pub fn with_stop_handle(mut self, handle: StopHandle) -> Self {
        self.stop = Some(handle);
        self
    }

    /// Configured end time, if any.
    pub const fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Configured step bound, if any.
    pub const fn max_steps(&self) -> Option<u64> {
        self.max_steps
    }

    /// Evaluate the conditions against the clock.
    ///
    /// Checked in order: stop request, liveness, end time, step bound.
    pub fn check(&mut self, clock: &Clock) -> Option<RunEndReason> {
        if self.stop.as_ref().is_some_and(StopHandle::is_stop_requested) {
            return Some(RunEndReason::StopRequested);
        }
        if self.liveness.as_mut().is_some_and(|alive| !alive()) {
            return Some(RunEndReason::LivenessLost);
        }
        if self.end_time.is_some_and(|end| clock.has_reached(end)) {
            return Some(RunEndReason::EndTimeReached);
        }
        if self.max_steps.is_some_and(|max| clock.step_count() >= max) {
            return Some(RunEndReason::MaxStepsReached);
        }
        None
    }
}

impl core::fmt::Debug for Termination {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Termination")
            .field("end_time", &self.end_time)
            .field("max_steps", &self.max_steps)
            .field("liveness", &self.liveness.is_some())
            .field("stop", &self.stop)
            .finish()
    }
}
