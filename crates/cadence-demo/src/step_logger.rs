//! Step observer that logs run progress.

use cadence_core::runner::{StepObserver, StepReport};
use tracing::info;

/// Logs phase changes as they happen and a progress line every
/// `interval` steps (0 disables progress lines).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepLogger {
    interval: u64,
    logged: u64,
}

impl StepLogger {
    /// Create a logger with a progress line every `interval` steps.
    pub const fn new(interval: u64) -> Self {
        Self {
            interval,
            logged: 0,
        }
    }

    /// Number of progress lines emitted.
    pub const fn logged(&self) -> u64 {
        self.logged
    }
}

impl StepObserver for StepLogger {
    fn on_step(&mut self, report: &StepReport) {
        for transition in &report.transitions {
            info!(
                from = transition.from_name,
                to = transition.to_name,
                elapsed = transition.elapsed,
                "Phase changed"
            );
        }

        if self.interval == 0 || report.step.checked_rem(self.interval) != Some(0) {
            return;
        }
        self.logged = self.logged.saturating_add(1);
        info!(
            step = report.step,
            elapsed = report.elapsed,
            phase = report.phase.as_deref(),
            failures = report.failures.len(),
            "Simulation progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(step: u64) -> StepReport {
        StepReport {
            step,
            elapsed: 0.0,
            phase: None,
            transitions: Vec::new(),
            events_fired: 0,
            tasks_fired: 0,
            failures: Vec::new(),
        }
    }

    #[test]
    fn logs_every_interval() {
        let mut logger = StepLogger::new(10);
        for step in 1..=35 {
            logger.on_step(&report(step));
        }
        assert_eq!(logger.logged(), 3);
    }

    #[test]
    fn zero_interval_is_silent() {
        let mut logger = StepLogger::new(0);
        for step in 1..=35 {
            logger.on_step(&report(step));
        }
        assert_eq!(logger.logged(), 0);
    }
}
