//! Actions and failure isolation.
//!
//! Periodic tasks, timed events and phase hooks all run user-supplied
//! closures. A failing closure (returning `Err` or panicking) is reported
//! as an [`ActionFailure`] and never stops sibling actions or the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

/// A zero-argument action run by the scheduler.
pub type Action = Box<dyn FnMut() -> anyhow::Result<()>>;

/// Which scheduler component invoked an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// A periodic task.
    PeriodicTask,
    /// A one-shot timed event.
    TimedEvent,
    /// A phase enter/exit hook or transition listener.
    PhaseHook,
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::PeriodicTask => "periodic task",
            Self::TimedEvent => "timed event",
            Self::PhaseHook => "phase hook",
        })
    }
}

/// An action that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} '{label}' failed: {message}")]
pub struct ActionFailure {
    /// Component that invoked the action.
    pub kind: ActionKind,
    /// Label of the task, event, or phase.
    pub label: String,
    /// Rendered error or panic message.
    pub message: String,
}

/// Outcome of dispatching the due actions of one component for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Number of actions invoked (successful or not).
    pub invoked: usize,
    /// Failures among the invoked actions.
    pub failures: Vec<ActionFailure>,
}

impl Dispatch {
    /// Record the outcome of one invocation.
    pub(crate) fn record(&mut self, outcome: Result<(), ActionFailure>) {
        self.invoked = self.invoked.saturating_add(1);
        if let Err(failure) = outcome {
            self.failures.push(failure);
        }
    }
}

/// Box a closure as an [`Action`].
pub fn boxed<F>(action: F) -> Action
where
    F: FnMut() -> anyhow::Result<()> + 'static,
{
    Box::new(action)
}

/// Run `action`, converting an error or a panic into an [`ActionFailure`].
pub(crate) fn run_isolated<F>(kind: ActionKind, label: &str, action: F) -> Result<(), ActionFailure>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    warn!(kind = %kind, label = label, error = %message, "action failed, continuing");

    Err(ActionFailure {
        kind,
        label: label.to_owned(),
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}
