//! One-shot events keyed by absolute simulation time.
//!
//! An event fires exactly once, on the first step whose start time has
//! reached its trigger time. Events are kept sorted by trigger time with
//! ties broken by registration order, so simultaneous events fire
//! deterministically. An event scheduled in the past fires on the next
//! step; this is how "do X once simulation time exceeds T" is expressed.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_types::EventId;
use tracing::{debug, info};

use crate::action::{self, Action, ActionKind, Dispatch};
use crate::clock::time_reached;
use crate::error::SchedulerError;

/// A scheduled one-shot event.
struct TimedEvent {
    id: EventId,
    name: String,
    trigger_time: f64,
    action: Action,
}

#[derive(Default)]
struct EventInbox {
    next_id: u64,
    staged: Vec<TimedEvent>,
}

fn validate_trigger_time(trigger_time: f64) -> Result<(), SchedulerError> {
    if trigger_time.is_finite() && trigger_time >= 0.0 {
        Ok(())
    } else {
        Err(SchedulerError::InvalidTime { trigger_time })
    }
}

/// Cloneable handle for scheduling events from inside actions.
///
/// Events scheduled through the handle join the queue at the next call to
/// [`TimedEventQueue::on_step`].
#[derive(Clone)]
pub struct EventScheduler {
    inbox: Rc<RefCell<EventInbox>>,
}

impl EventScheduler {
    /// Stage an event firing once `trigger_time` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTime`] if `trigger_time` is negative
    /// or not finite.
    pub fn schedule<F>(&self, trigger_time: f64, action: F) -> Result<EventId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.schedule_named("", trigger_time, action)
    }

    /// Stage a labelled event firing once `trigger_time` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTime`] if `trigger_time` is negative
    /// or not finite.
    pub fn schedule_named<F>(
        &self,
        name: &str,
        trigger_time: f64,
        action: F,
    ) -> Result<EventId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        validate_trigger_time(trigger_time)?;
        let mut inbox = self.inbox.borrow_mut();
        let id = EventId(inbox.next_id);
        inbox.next_id = inbox.next_id.saturating_add(1);
        inbox.staged.push(TimedEvent {
            id,
            name: if name.is_empty() { id.to_string() } else { name.to_owned() },
            trigger_time,
            action: action::boxed(action),
        });
        debug!(event = %id, trigger_time, "timed event staged");
        Ok(id)
    }
}

impl core::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventScheduler").finish_non_exhaustive()
    }
}

/// Queue of one-shot events ordered by trigger time.
///
/// Fired events are removed along with their actions; only a count of
/// them is kept.
pub struct TimedEventQueue {
    /// Unfired events, sorted by `(trigger_time, id)`.
    pending: Vec<TimedEvent>,
    fired: usize,
    inbox: Rc<RefCell<EventInbox>>,
}

impl Default for TimedEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimedEventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            fired: 0,
            inbox: Rc::new(RefCell::new(EventInbox::default())),
        }
    }

    /// Return a handle that actions can capture to schedule events mid-run.
    pub fn scheduler(&self) -> EventScheduler {
        EventScheduler {
            inbox: Rc::clone(&self.inbox),
        }
    }

    /// Schedule an event firing once `trigger_time` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTime`] if `trigger_time` is negative
    /// or not finite.
    pub fn schedule<F>(&mut self, trigger_time: f64, action: F) -> Result<EventId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        self.schedule_named("", trigger_time, action)
    }

    /// Schedule a labelled event firing once `trigger_time` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTime`] if `trigger_time` is negative
    /// or not finite.
    pub fn schedule_named<F>(
        &mut self,
        name: &str,
        trigger_time: f64,
        action: F,
    ) -> Result<EventId, SchedulerError>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        let id = self.scheduler().schedule_named(name, trigger_time, action)?;
        self.merge_staged();
        Ok(id)
    }

    /// Fire every pending event whose trigger time `elapsed` has reached.
    pub fn on_step(&mut self, elapsed: f64) -> Dispatch {
        self.merge_staged();

        // Sorted ascending: the due events are a prefix.
        let due = self
            .pending
            .partition_point(|event| time_reached(elapsed, event.trigger_time));
        let mut dispatch = Dispatch::default();
        for mut event in self.pending.drain(..due) {
            info!(event = event.name, trigger_time = event.trigger_time, elapsed, "timed event firing");
            let outcome =
                action::run_isolated(ActionKind::TimedEvent, &event.name, || (event.action)());
            self.fired = self.fired.saturating_add(1);
            dispatch.record(outcome);
        }
        dispatch
    }

    /// Whether an event has fired, if it is known to the queue.
    ///
    /// Events still staged by an [`EventScheduler`] are not known yet.
    pub fn is_fired(&self, id: EventId) -> Option<bool> {
        if self.pending.iter().any(|event| event.id == id) {
            return Some(false);
        }
        let inbox = self.inbox.borrow();
        if id.0 >= inbox.next_id || inbox.staged.iter().any(|event| event.id == id) {
            return None;
        }
        Some(true)
    }

    /// Number of events that have not fired yet (staged events excluded).
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of events that have fired.
    pub const fn fired(&self) -> usize {
        self.fired
    }

    /// Trigger time of the earliest pending event.
    pub fn next_trigger_time(&self) -> Option<f64> {
        self.pending.first().map(|event| event.trigger_time)
    }

    /// Total number of events known to the queue, fired or not.
    pub fn len(&self) -> usize {
        self.pending.len().saturating_add(self.fired)
    }

    /// Whether the queue holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn merge_staged(&mut self) {
        let staged = std::mem::take(&mut self.inbox.borrow_mut().staged);
        for event in staged {
            // Insert after every event with trigger <= this one: equal
            // trigger times keep registration order.
            let at = self
                .pending
                .partition_point(|existing| existing.trigger_time <= event.trigger_time);
            self.pending.insert(at, event);
        }
    }
}

impl core::fmt::Debug for TimedEventQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimedEventQueue")
            .field("pending", &self.pending.len())
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}
