//! Periodic tasks clocked off the master step counter.
//!
//! Each task is registered with a target frequency. Its cadence is fixed at
//! registration as a whole number of steps, rounded up so a task never runs
//! more often than requested. A task fires on every step count that its
//! interval divides, including step 0.
//!
//! Tasks may be registered from inside a running action through a
//! [`TaskRegistrar`]. Those registrations are validated immediately but only
//! join the set at the next step boundary.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_types::{TaskFireCount, TaskId};
use tracing::debug;

use crate::action::{self, Action, ActionKind, Dispatch};
use crate::clock::{Clock, TIME_TOLERANCE};
use crate::error::SchedulerError;

/// A registered periodic task.
struct PeriodicTask {
    /// Registration handle.
    id: TaskId,
    /// Label used in logs and reports.
    name: String,
    /// Requested frequency in Hz.
    frequency_hz: f64,
    /// Cadence in steps (at least 1).
    step_interval: u64,
    /// Number of times the task has fired.
    counter: u64,
    /// The work to perform.
    action: Action,
}

/// Registrations waiting for the next step boundary, plus the id sequence.
#[derive(Default)]
struct TaskInbox {
    next_id: u64,
    staged: Vec<PeriodicTask>,
}

impl TaskInbox {
    fn allocate(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }
}

/// Compute the step cadence for a frequency at a fixed step size.
///
/// Returns `ceil(1 / (frequency_hz * step_size))`, at least 1. A ratio
/// within floating-point noise of an integer is snapped to it first, so
/// 100 Hz at a 0.01 s step is every step, not every second step.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidFrequency`] unless `frequency_hz` is
/// finite and positive, and [`SchedulerError::IntervalOverflow`] if the
/// interval does not fit in a `u64`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn step_interval(frequency_hz: f64, step_size: f64) -> Result<u64, SchedulerError> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(SchedulerError::InvalidFrequency { frequency_hz });
    }

    let ratio = 1.0 / (frequency_hz * step_size);
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() <= TIME_TOLERANCE * nearest.max(1.0) {
        nearest
    } else {
        ratio.ceil()
    };

    if !steps.is_finite() || steps >= u64::MAX as f64 {
        return Err(SchedulerError::IntervalOverflow {
            frequency_hz,
            step_size,
        });
    }

    // In range and non-negative: checked above.
    Ok((steps as u64).max(1))
}

/// Cloneable handle for registering periodic tasks from inside actions.
#[derive(Clone)]
pub struct TaskRegistrar {
    step_size: f64,
    inbox: Rc<RefCell<TaskInbox>>,
}

impl TaskRegistrar {
    /// Stage a task for registration at the next step boundary.
    ///
    /// # Errors
    ///
    /// See [`step_interval`].
    pub fn register<F>(&self, frequency_hz: f64, action: F) -> Result<TaskId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.register_named("", frequency_hz, action)
    }

    /// Stage a labelled task for registration at the next step boundary.
    ///
    /// # Errors
    ///
    /// See [`step_interval`].
    pub fn register_named<F>(
        &self,
        name: &str,
        frequency_hz: f64,
        action: F,
    ) -> Result<TaskId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        let interval = step_interval(frequency_hz, self.step_size)?;
        let mut inbox = self.inbox.borrow_mut();
        let id = inbox.allocate();
        inbox.staged.push(PeriodicTask {
            id,
            name: label_or_id(name, id),
            frequency_hz,
            step_interval: interval,
            counter: 0,
            action: action::boxed(action),
        });
        debug!(task = %id, frequency_hz, step_interval = interval, "periodic task staged");
        Ok(id)
    }
}

impl core::fmt::Debug for TaskRegistrar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskRegistrar")
            .field("step_size", &self.step_size)
            .finish_non_exhaustive()
    }
}

/// Ordered set of periodic tasks sharing one step counter.
pub struct PeriodicTaskSet {
    step_size: f64,
    tasks: Vec<PeriodicTask>,
    inbox: Rc<RefCell<TaskInbox>>,
}

impl PeriodicTaskSet {
    /// Create an empty task set bound to the clock's step size.
    pub fn new(clock: &Clock) -> Self {
        Self {
            step_size: clock.step_size(),
            tasks: Vec::new(),
            inbox: Rc::new(RefCell::new(TaskInbox::default())),
        }
    }

    /// Return a handle that actions can capture to register tasks mid-run.
    pub fn registrar(&self) -> TaskRegistrar {
        TaskRegistrar {
            step_size: self.step_size,
            inbox: Rc::clone(&self.inbox),
        }
    }

    /// Register a task firing at `frequency_hz`.
    ///
    /// # Errors
    ///
    /// See [`step_interval`].
    pub fn register<F>(&mut self, frequency_hz: f64, action: F) -> Result<TaskId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.register_named("", frequency_hz, action)
    }

    /// Register a labelled task firing at `frequency_hz`.
    ///
    /// # Errors
    ///
    /// See [`step_interval`].
    pub fn register_named<F>(
        &mut self,
        name: &str,
        frequency_hz: f64,
        action: F,
    ) -> Result<TaskId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        let id = self.registrar().register_named(name, frequency_hz, action)?;
        self.merge_staged();
        Ok(id)
    }

    /// Run every task due on `step_count`, in registration order.
    pub fn on_step(&mut self, step_count: u64) -> Dispatch {
        self.merge_staged();

        let mut dispatch = Dispatch::default();
        for task in &mut self.tasks {
            if step_count.checked_rem(task.step_interval) != Some(0) {
                continue;
            }
            task.counter = task.counter.saturating_add(1);
            let outcome =
                action::run_isolated(ActionKind::PeriodicTask, &task.name, || (task.action)());
            dispatch.record(outcome);
        }
        dispatch
    }

    /// Number of times a task has fired, if it is registered.
    pub fn counter(&self, id: TaskId) -> Option<u64> {
        self.find(id).map(|task| task.counter)
    }

    /// Step cadence of a task, if it is registered.
    pub fn step_interval(&self, id: TaskId) -> Option<u64> {
        self.find(id).map(|task| task.step_interval)
    }

    /// Requested frequency of a task, if it is registered.
    pub fn frequency_hz(&self, id: TaskId) -> Option<f64> {
        self.find(id).map(|task| task.frequency_hz)
    }

    /// Fire counts of all active tasks, in registration order.
    pub fn fire_counts(&self) -> Vec<TaskFireCount> {
        self.tasks
            .iter()
            .map(|task| TaskFireCount {
                name: task.name.clone(),
                fires: task.counter,
            })
            .collect()
    }

    /// Number of active tasks (staged registrations excluded).
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is active.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn find(&self, id: TaskId) -> Option<&PeriodicTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    fn merge_staged(&mut self) {
        // Staged ids are always above every active id, so appending keeps
        // registration order.
        let staged = std::mem::take(&mut self.inbox.borrow_mut().staged);
        self.tasks.extend(staged);
    }
}

impl core::fmt::Debug for PeriodicTaskSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PeriodicTaskSet")
            .field("step_size", &self.step_size)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

fn label_or_id(name: &str, id: TaskId) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    fn task_set(step_size: f64) -> PeriodicTaskSet {
        PeriodicTaskSet::new(&Clock::new(step_size).unwrap())
    }

    #[test]
    fn interval_rounds_up() {
        // 60 FPS at 1 ms: 16.67 steps -> 17.
        assert_eq!(step_interval(60.0, 1e-3).unwrap(), 17);
        // 100 FPS at 1 ms: exactly 10.
        assert_eq!(step_interval(100.0, 1e-3).unwrap(), 10);
        assert_eq!(step_interval(100.0, 0.01).unwrap(), 1);
        // Faster than the physics rate still fires at most every step.
        assert_eq!(step_interval(1_000.0, 0.01).unwrap(), 1);
        assert_eq!(step_interval(50.0, 2e-3).unwrap(), 10);
    }

    #[test]
    fn rejects_invalid_frequency() {
        let mut set = task_set(0.01);
        assert!(matches!(
            set.register(0.0, || Ok(())),
            Err(SchedulerError::InvalidFrequency { .. })
        ));
        assert!(set.register(-5.0, || Ok(())).is_err());
        assert!(set.register(f64::NAN, || Ok(())).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn fires_on_multiples_of_interval_only() {
        for k in 1..=7_u32 {
            let step_size = 0.01;
            let mut set = task_set(step_size);
            let fired = Rc::new(RefCell::new(Vec::new()));
            let current = Rc::new(Cell::new(0_u64));
            let (fired_in, current_in) = (Rc::clone(&fired), Rc::clone(&current));
            let hz = 1.0 / (f64::from(k) * step_size);
            let id = set
                .register(hz, move || {
                    fired_in.borrow_mut().push(current_in.get());
                    Ok(())
                })
                .unwrap();
            assert_eq!(set.step_interval(id), Some(u64::from(k)));

            for step in 0..50_u64 {
                current.set(step);
                let _ = set.on_step(step);
            }
            let expected: Vec<u64> = (0..50).filter(|s| s % u64::from(k) == 0).collect();
            assert_eq!(*fired.borrow(), expected);
            assert_eq!(set.counter(id), Some(expected.len() as u64));
        }
    }

    #[test]
    fn tasks_run_in_registration_order() {
        let mut set = task_set(0.01);
        let order = Rc::new(RefCell::new(Vec::new()));
        for label in ["log", "image", "publish"] {
            let order = Rc::clone(&order);
            let _ = set
                .register_named(label, 100.0, move || {
                    order.borrow_mut().push(label);
                    Ok(())
                })
                .unwrap();
        }
        let dispatch = set.on_step(3);
        assert_eq!(dispatch.invoked, 3);
        assert_eq!(*order.borrow(), vec!["log", "image", "publish"]);
    }

    #[test]
    fn failing_task_does_not_block_siblings() {
        let mut set = task_set(0.01);
        let ran = Rc::new(Cell::new(0_u32));
        let _ = set
            .register_named("broken", 100.0, || Err(anyhow::anyhow!("disk full")))
            .unwrap();
        let ran_in = Rc::clone(&ran);
        let _ = set
            .register_named("healthy", 100.0, move || {
                ran_in.set(ran_in.get() + 1);
                Ok(())
            })
            .unwrap();

        let first = set.on_step(1);
        let second = set.on_step(2);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures.first().unwrap().label, "broken");
        assert_eq!(second.invoked, 2);
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn registration_during_step_joins_next_boundary() {
        let mut set = task_set(0.01);
        let registrar = set.registrar();
        let late_runs = Rc::new(Cell::new(0_u32));
        let late_in = Rc::clone(&late_runs);
        let mut spawned = false;
        let _ = set
            .register_named("spawner", 100.0, move || {
                if !spawned {
                    spawned = true;
                    let late_in = Rc::clone(&late_in);
                    let _ = registrar.register_named("late", 100.0, move || {
                        late_in.set(late_in.get() + 1);
                        Ok(())
                    })?;
                }
                Ok(())
            })
            .unwrap();

        let first = set.on_step(1);
        assert_eq!(first.invoked, 1);
        assert_eq!(late_runs.get(), 0);
        assert_eq!(set.len(), 1);

        let second = set.on_step(2);
        assert_eq!(second.invoked, 2);
        assert_eq!(late_runs.get(), 1);
        assert_eq!(set.len(), 2);
    }
}
