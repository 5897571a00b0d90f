//! Named phases laid end to end on the simulation timeline.
//!
//! A run is split into a linear chain of phases (e.g. pose, settle,
//! locomote). Each phase has a duration except the last, which lasts
//! until the run ends. The current phase is a pure function of elapsed
//! time; the controller only remembers the last index it observed so that
//! enter/exit hooks fire exactly once per boundary crossing.
//!
//! # Hook order
//!
//! - On the first [`PhaseController::on_step`], the first phase's enter
//!   hooks run.
//! - For each crossed boundary `i -> i+1`, in order: exit hooks of `i`,
//!   enter hooks of `i+1`, then transition listeners.
//! - A coarse step may cross several boundaries at once; every crossing
//!   is still reported individually.

use cadence_types::PhaseTransition;
use tracing::info;

use crate::action::{self, Action, ActionKind, Dispatch};
use crate::clock::time_reached;
use crate::error::SchedulerError;

/// Duration of a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseDuration {
    /// A fixed duration in seconds (zero allowed).
    Finite(f64),
    /// Lasts until the run ends. Only valid for the last phase.
    Unbounded,
}

impl PhaseDuration {
    /// `Some(d)` is finite, `None` is unbounded.
    pub const fn from_option(duration: Option<f64>) -> Self {
        match duration {
            Some(d) => Self::Finite(d),
            None => Self::Unbounded,
        }
    }
}

/// Configuration-time description of a phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSpec {
    /// Unique, non-empty phase name.
    pub name: String,
    /// How long the phase lasts.
    pub duration: PhaseDuration,
}

impl PhaseSpec {
    /// A phase lasting `seconds`.
    pub fn finite(name: &str, seconds: f64) -> Self {
        Self {
            name: name.to_owned(),
            duration: PhaseDuration::Finite(seconds),
        }
    }

    /// A terminal phase with no end.
    pub fn unbounded(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            duration: PhaseDuration::Unbounded,
        }
    }
}

/// Listener notified of every boundary crossing.
pub type TransitionListener = Box<dyn FnMut(&PhaseTransition) -> anyhow::Result<()>>;

struct Phase {
    name: String,
    duration: PhaseDuration,
    /// Simulation time at which this phase ends (cumulative).
    ends_at: f64,
    on_enter: Vec<Action>,
    on_exit: Vec<Action>,
}

/// Outcome of evaluating phases for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseStep {
    /// Boundary crossings observed this step, in order.
    pub transitions: Vec<PhaseTransition>,
    /// Hooks and listeners invoked.
    pub dispatch: Dispatch,
}

/// Derives the current phase from elapsed time and runs phase hooks.
pub struct PhaseController {
    phases: Vec<Phase>,
    listeners: Vec<TransitionListener>,
    last_index: Option<usize>,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::empty()
    }
}

impl PhaseController {
    /// A controller with no phases; [`on_step`](Self::on_step) is a no-op.
    pub const fn empty() -> Self {
        Self {
            phases: Vec::new(),
            listeners: Vec::new(),
            last_index: None,
        }
    }

    /// Build a controller from an ordered phase list.
    ///
    /// The last phase is terminal: if it has a finite duration, that
    /// duration is recorded but never ends the phase.
    ///
    /// # Errors
    ///
    /// Returns a [`SchedulerError`] for empty or duplicate names, negative
    /// or non-finite durations, or an unbounded phase that is not last.
    pub fn new<I>(specs: I) -> Result<Self, SchedulerError>
    where
        I: IntoIterator<Item = PhaseSpec>,
    {
        let specs: Vec<PhaseSpec> = specs.into_iter().collect();
        let last = specs.len().saturating_sub(1);
        let mut phases: Vec<Phase> = Vec::with_capacity(specs.len());
        let mut ends_at = 0.0_f64;

        for (index, spec) in specs.into_iter().enumerate() {
            if spec.name.is_empty() {
                return Err(SchedulerError::EmptyPhaseName);
            }
            if phases.iter().any(|p| p.name == spec.name) {
                return Err(SchedulerError::DuplicatePhase { phase: spec.name });
            }
            match spec.duration {
                PhaseDuration::Finite(d) if !d.is_finite() || d < 0.0 => {
                    return Err(SchedulerError::InvalidPhaseDuration {
                        phase: spec.name,
                        duration: d,
                    });
                }
                PhaseDuration::Finite(d) => ends_at += d,
                PhaseDuration::Unbounded if index != last => {
                    return Err(SchedulerError::UnboundedPhaseNotLast { phase: spec.name });
                }
                PhaseDuration::Unbounded => ends_at = f64::INFINITY,
            }
            phases.push(Phase {
                name: spec.name,
                duration: spec.duration,
                ends_at,
                on_enter: Vec::new(),
                on_exit: Vec::new(),
            });
        }

        Ok(Self {
            phases,
            listeners: Vec::new(),
            last_index: None,
        })
    }

    /// Attach a hook run when `phase` is entered. Multiple hooks run in
    /// attachment order.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPhase`] if no phase has that name.
    pub fn on_enter<F>(&mut self, phase: &str, hook: F) -> Result<(), SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.phase_mut(phase)?.on_enter.push(action::boxed(hook));
        Ok(())
    }

    /// Attach a hook run when `phase` is exited. Multiple hooks run in
    /// attachment order.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPhase`] if no phase has that name.
    pub fn on_exit<F>(&mut self, phase: &str, hook: F) -> Result<(), SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.phase_mut(phase)?.on_exit.push(action::boxed(hook));
        Ok(())
    }

    /// Attach a listener notified of every boundary crossing.
    pub fn on_transition<F>(&mut self, listener: F)
    where
        F: FnMut(&PhaseTransition) -> anyhow::Result<()> + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Index of the phase active at `elapsed`, or `None` if no phases.
    pub fn index_at(&self, elapsed: f64) -> Option<usize> {
        let terminal = self.phases.len().checked_sub(1)?;
        let crossed = self
            .phases
            .iter()
            .take(terminal)
            .take_while(|phase| time_reached(elapsed, phase.ends_at))
            .count();
        Some(crossed)
    }

    /// Evaluate phases at `elapsed`, running hooks for every crossing since
    /// the last call. Never moves backwards.
    pub fn on_step(&mut self, elapsed: f64) -> PhaseStep {
        let mut step = PhaseStep::default();
        let Some(target) = self.index_at(elapsed) else {
            return step;
        };

        let mut current = match self.last_index {
            Some(index) => index,
            None => {
                if let Some(first) = self.phases.first_mut() {
                    info!(phase = first.name, elapsed, "entering first phase");
                    run_hooks(&first.name, &mut first.on_enter, &mut step.dispatch);
                }
                0
            }
        };

        while current < target {
            let next = current.saturating_add(1);
            let transition = self.cross(current, next, elapsed, &mut step.dispatch);
            step.transitions.extend(transition);
            current = next;
        }

        self.last_index = Some(current);
        step
    }

    /// Index of the last observed phase, `None` before the first step.
    pub const fn current_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Name of the last observed phase, `None` before the first step.
    pub fn current_name(&self) -> Option<&str> {
        self.last_index
            .and_then(|index| self.phases.get(index))
            .map(|phase| phase.name.as_str())
    }

    /// Configured phase names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|phase| phase.name.as_str())
    }

    /// Duration of a phase by name.
    pub fn duration(&self, phase: &str) -> Option<PhaseDuration> {
        self.phases
            .iter()
            .find(|p| p.name == phase)
            .map(|p| p.duration)
    }

    /// Simulation time at which `phase` starts.
    pub fn start_time(&self, phase: &str) -> Option<f64> {
        let index = self.phases.iter().position(|p| p.name == phase)?;
        Some(
            index
                .checked_sub(1)
                .and_then(|prev| self.phases.get(prev))
                .map_or(0.0, |prev| prev.ends_at),
        )
    }

    /// Number of configured phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Whether no phases are configured.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    fn phase_mut(&mut self, name: &str) -> Result<&mut Phase, SchedulerError> {
        self.phases
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SchedulerError::UnknownPhase {
                phase: name.to_owned(),
            })
    }

    fn cross(
        &mut self,
        from: usize,
        to: usize,
        elapsed: f64,
        dispatch: &mut Dispatch,
    ) -> Option<PhaseTransition> {
        let (left, right) = self.phases.split_at_mut(to);
        let exiting = left.last_mut()?;
        let entering = right.first_mut()?;

        info!(from = exiting.name, to = entering.name, elapsed, "phase transition");

        run_hooks(&exiting.name, &mut exiting.on_exit, dispatch);
        run_hooks(&entering.name, &mut entering.on_enter, dispatch);

        let transition = PhaseTransition {
            from_index: from,
            from_name: exiting.name.clone(),
            to_index: to,
            to_name: entering.name.clone(),
            elapsed,
        };
        for listener in &mut self.listeners {
            let outcome = action::run_isolated(ActionKind::PhaseHook, &transition.to_name, || {
                listener(&transition)
            });
            dispatch.record(outcome);
        }
        Some(transition)
    }
}

fn run_hooks(label: &str, hooks: &mut [Action], dispatch: &mut Dispatch) {
    for hook in hooks {
        dispatch.record(action::run_isolated(ActionKind::PhaseHook, label, || hook()));
    }
}

impl core::fmt::Debug for PhaseController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhaseController")
            .field("phases", &self.names().collect::<Vec<_>>())
            .field("last_index", &self.last_index)
            .finish_non_exhaustive()
    }
}
