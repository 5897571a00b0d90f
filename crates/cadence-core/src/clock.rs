//! Fixed-step simulation clock.
//!
//! The clock is the single source of truth for simulation time. It only
//! counts steps; elapsed time is always derived as `step_count * step_size`
//! and never accumulated, so no drift builds up over long runs.

/// Relative tolerance used when comparing simulation time against a
/// threshold (trigger times, phase boundaries, end time).
pub const TIME_TOLERANCE: f64 = 1e-9;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Step size is zero, negative, or not finite.
    #[error("invalid step size {value}: must be finite and greater than zero")]
    InvalidStepSize {
        /// The rejected step size.
        value: f64,
    },

    /// Step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u64::MAX")]
    StepOverflow,
}

/// Fixed-step clock tracking elapsed simulation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    /// Fixed duration of one step, in seconds.
    step_size: f64,

    /// Number of completed steps.
    step_count: u64,
}

impl Clock {
    /// Create a clock at time zero with the given fixed step size.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidStepSize`] unless `step_size` is finite
    /// and strictly positive.
    pub fn new(step_size: f64) -> Result<Self, ClockError> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(ClockError::InvalidStepSize { value: step_size });
        }
        Ok(Self {
            step_size,
            step_count: 0,
        })
    }

    /// Advance the clock by one step. Returns the new step count.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::StepOverflow`] if the counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.step_count = self
            .step_count
            .checked_add(1)
            .ok_or(ClockError::StepOverflow)?;
        Ok(self.step_count)
    }

    /// Return elapsed simulation time in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed(&self) -> f64 {
        // Exact for every step count below 2^53.
        self.step_count as f64 * self.step_size
    }

    /// Return the number of completed steps.
    pub const fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Return the fixed step size in seconds.
    pub const fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Whether elapsed time has reached `threshold`, within tolerance.
    pub fn has_reached(&self, threshold: f64) -> bool {
        time_reached(self.elapsed(), threshold)
    }
}

/// Whether `elapsed >= threshold`, allowing for floating-point noise in
/// `step_count * step_size`.
pub fn time_reached(elapsed: f64, threshold: f64) -> bool {
    let slack = TIME_TOLERANCE * threshold.abs().max(1.0);
    elapsed >= threshold - slack
}
