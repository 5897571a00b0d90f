//! Fixed-step simulation loop.
//!
//! [`SimulationLoop`] owns the clock, the periodic task set, the timed event
//! queue and the phase controller, and drives an external physics stepper.
//! Each iteration runs in this order:
//!
//! 1. Check termination; stop if satisfied.
//! 2. Fire due timed events (at the step's start time).
//! 3. Evaluate phases (at the step's start time).
//! 4. Advance physics by one step.
//! 5. Advance the clock.
//! 6. Run periodic tasks due on the new step count.
//! 7. Begin, render and end a frame, if a renderer is attached.
//!
//! Events and phase hooks therefore change the world *before* the step
//! integrates, and periodic outputs observe the world *after* it.

use cadence_types::{PhaseTransition, RunEndReason, RunId, TaskFireCount};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::action::ActionFailure;
use crate::clock::{Clock, ClockError};
use crate::collaborator::{CollaboratorError, PhysicsStepper, Renderer};
use crate::config::ScheduleConfig;
use crate::error::SchedulerError;
use crate::events::{EventScheduler, TimedEventQueue};
use crate::operator::Termination;
use crate::periodic::{PeriodicTaskSet, TaskRegistrar};
use crate::phase::PhaseController;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The physics stepper failed.
    #[error("physics step {step} failed: {source}")]
    Physics {
        /// Step count before the failed step.
        step: u64,
        /// The underlying collaborator error.
        source: CollaboratorError,
    },

    /// The renderer failed.
    #[error("render after step {step} failed: {source}")]
    Render {
        /// Step count after the physics step.
        step: u64,
        /// The underlying collaborator error.
        source: CollaboratorError,
    },

    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// Summary of one completed iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Step count after the iteration.
    pub step: u64,
    /// Elapsed simulation time after the iteration.
    pub elapsed: f64,
    /// Phase active during the iteration, if phases are configured.
    pub phase: Option<String>,
    /// Phase boundaries crossed at the start of the iteration.
    pub transitions: Vec<PhaseTransition>,
    /// Timed events fired at the start of the iteration.
    pub events_fired: usize,
    /// Periodic tasks run after the physics step.
    pub tasks_fired: usize,
    /// Actions that failed during the iteration (isolated, not fatal).
    pub failures: Vec<ActionFailure>,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Identifier of the run.
    pub run_id: RunId,
    /// Why the run stopped.
    pub end_reason: RunEndReason,
    /// Iterations executed by this call.
    pub total_steps: u64,
    /// Elapsed simulation time at the end.
    pub final_elapsed: f64,
    /// Phase active at the end, if phases are configured.
    pub final_phase: Option<String>,
    /// Fire count of every periodic task.
    pub task_counts: Vec<TaskFireCount>,
    /// Number of isolated action failures during this call.
    pub action_failures: u64,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the run.
    pub finished_at: DateTime<Utc>,
}

/// Callback invoked after each iteration completes.
pub trait StepObserver {
    /// Called after an iteration completes successfully.
    fn on_step(&mut self, report: &StepReport);
}

/// A step observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl StepObserver for NoOpObserver {
    fn on_step(&mut self, _report: &StepReport) {}
}

/// Composes the scheduler components with a physics stepper and an
/// optional renderer.
pub struct SimulationLoop<S> {
    run_id: RunId,
    clock: Clock,
    tasks: PeriodicTaskSet,
    events: TimedEventQueue,
    phases: PhaseController,
    termination: Termination,
    stepper: S,
    renderer: Option<Box<dyn Renderer>>,
}

impl<S: PhysicsStepper> SimulationLoop<S> {
    /// Create a loop around `clock` and `stepper` with no tasks, events,
    /// phases or termination conditions.
    pub fn new(clock: Clock, stepper: S) -> Self {
        let tasks = PeriodicTaskSet::new(&clock);
        Self {
            run_id: RunId::new(),
            clock,
            tasks,
            events: TimedEventQueue::new(),
            phases: PhaseController::empty(),
            termination: Termination::new(),
            stepper,
            renderer: None,
        }
    }

    /// Create a loop with the clock, phases and termination described by
    /// `config`. Periodic tasks and events are bound by the caller.
    ///
    /// # Errors
    ///
    /// Returns a [`SchedulerError`] if the schedule is malformed.
    pub fn from_config(config: &ScheduleConfig, stepper: S) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::new(config.clock()?, stepper)
            .with_phases(config.phase_controller()?)
            .with_termination(config.termination()?))
    }

    /// Replace the phase controller.
    #[must_use]
    pub fn with_phases(mut self, phases: PhaseController) -> Self {
        self.phases = phases;
        self
    }

    /// Replace the termination conditions.
    #[must_use]
    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    /// Attach a renderer, called once per iteration after periodic tasks.
    #[must_use]
    pub fn with_renderer<R: Renderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Run one iteration (steps 2 to 7) without checking termination.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if a collaborator fails or the clock overflows.
    /// Action failures are reported in the [`StepReport`] instead.
    pub fn step(&mut self) -> Result<StepReport, RunError> {
        let start = self.clock.elapsed();

        let events = self.events.on_step(start);
        let phase_step = self.phases.on_step(start);
        let phase = self.phases.current_name().map(str::to_owned);

        self.stepper
            .advance(self.clock.step_size())
            .map_err(|source| RunError::Physics {
                step: self.clock.step_count(),
                source,
            })?;
        let step = self.clock.advance()?;

        let tasks = self.tasks.on_step(step);

        if let Some(renderer) = self.renderer.as_mut() {
            present(&mut **renderer).map_err(|source| RunError::Render { step, source })?;
        }

        let mut failures = events.failures;
        failures.extend(phase_step.dispatch.failures);
        failures.extend(tasks.failures);

        Ok(StepReport {
            step,
            elapsed: self.clock.elapsed(),
            phase,
            transitions: phase_step.transitions,
            events_fired: events.invoked,
            tasks_fired: tasks.invoked,
            failures,
        })
    }

    /// Run until a termination condition is met.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] as soon as a collaborator fails; the loop does
    /// not retry.
    pub fn run(&mut self, observer: &mut dyn StepObserver) -> Result<RunResult, RunError> {
        let started_at = Utc::now();
        let mut total_steps: u64 = 0;
        let mut action_failures: u64 = 0;

        info!(
            run_id = %self.run_id,
            step_size = self.clock.step_size(),
            end_time = self.termination.end_time(),
            max_steps = self.termination.max_steps(),
            phases = self.phases.len(),
            periodic_tasks = self.tasks.len(),
            timed_events = self.events.len(),
            "Simulation starting"
        );

        let end_reason = loop {
            if let Some(reason) = self.termination.check(&self.clock) {
                break reason;
            }

            let report = self.step()?;
            total_steps = total_steps.saturating_add(1);
            action_failures =
                action_failures.saturating_add(u64::try_from(report.failures.len()).unwrap_or(u64::MAX));

            debug!(
                step = report.step,
                elapsed = report.elapsed,
                phase = report.phase.as_deref(),
                events = report.events_fired,
                tasks = report.tasks_fired,
                "step complete"
            );
            observer.on_step(&report);
        };

        Ok(RunResult {
            run_id: self.run_id,
            end_reason,
            total_steps,
            final_elapsed: self.clock.elapsed(),
            final_phase: self.phases.current_name().map(str::to_owned),
            task_counts: self.tasks.fire_counts(),
            action_failures,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run until termination without observing individual steps.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_to_end(&mut self) -> Result<RunResult, RunError> {
        self.run(&mut NoOpObserver)
    }

    /// Identifier of this run.
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The clock (read-only; only the loop advances it).
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The periodic task set.
    pub const fn tasks(&self) -> &PeriodicTaskSet {
        &self.tasks
    }

    /// Mutable access to the periodic task set, for registration.
    pub const fn tasks_mut(&mut self) -> &mut PeriodicTaskSet {
        &mut self.tasks
    }

    /// The timed event queue.
    pub const fn events(&self) -> &TimedEventQueue {
        &self.events
    }

    /// Mutable access to the timed event queue, for scheduling.
    pub const fn events_mut(&mut self) -> &mut TimedEventQueue {
        &mut self.events
    }

    /// The phase controller.
    pub const fn phases(&self) -> &PhaseController {
        &self.phases
    }

    /// Mutable access to the phase controller, for attaching hooks.
    pub const fn phases_mut(&mut self) -> &mut PhaseController {
        &mut self.phases
    }

    /// Handle for registering periodic tasks from inside actions.
    pub fn task_registrar(&self) -> TaskRegistrar {
        self.tasks.registrar()
    }

    /// Handle for scheduling events from inside actions.
    pub fn event_scheduler(&self) -> EventScheduler {
        self.events.scheduler()
    }

    /// The physics stepper.
    pub const fn stepper(&self) -> &S {
        &self.stepper
    }

    /// Mutable access to the physics stepper.
    pub const fn stepper_mut(&mut self) -> &mut S {
        &mut self.stepper
    }
}

impl<S> core::fmt::Debug for SimulationLoop<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationLoop")
            .field("run_id", &self.run_id)
            .field("clock", &self.clock)
            .field("tasks", &self.tasks)
            .field("events", &self.events)
            .field("phases", &self.phases)
            .field("termination", &self.termination)
            .field("renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

fn present(renderer: &mut dyn Renderer) -> Result<(), CollaboratorError> {
    renderer.begin_frame()?;
    renderer.render()?;
    renderer.end_frame()
}

/// Log the end of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        run_id = %result.run_id,
        reason = ?result.end_reason,
        total_steps = result.total_steps,
        final_elapsed = result.final_elapsed,
        final_phase = result.final_phase.as_deref(),
        action_failures = result.action_failures,
        wall_ms = (result.finished_at - result.started_at).num_milliseconds(),
        "Simulation ended"
    );

    for count in &result.task_counts {
        info!(task = count.name, fires = count.fires, "Periodic task summary");
    }

    if result.total_steps == 0 {
        warn!("Simulation ended with no steps executed");
    }
}
