//! Defines scheduled events, their dispatch context, and the observation
//! stream broadcast by the scheduler.

use crate::common::EventId;
use crate::scheduler::Scheduler;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased argument forwarded to a callback after its context.
///
/// The callback is responsible for downcasting to the expected concrete type.
pub type Arg = Arc<dyn Any + Send + Sync>;

/// The invokable attached to a scheduled event.
///
/// Callbacks are shared so a callback can re-schedule itself. The return
/// value is never consulted.
pub type Callback = Arc<dyn Fn(&EventContext, &[Arg]) + Send + Sync>;

/// Builds a [`Callback`] from a closure.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&EventContext, &[Arg]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a value as a callback [`Arg`].
pub fn arg<T: Any + Send + Sync>(value: T) -> Arg {
    Arc::new(value)
}

/// What a callback receives first when its event is dispatched.
#[derive(Clone)]
pub struct EventContext {
    /// The scheduler dispatching the event. Callbacks may insert, remove or
    /// stop through it.
    pub target: Scheduler,
    /// When the event should take effect on the clock timeline, already
    /// floored at the current clock time and offset forward.
    pub playback_time: f64,
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("playback_time", &self.playback_time)
            .finish_non_exhaustive()
    }
}

/// One pending entry of the scheduler's queue.
#[derive(Clone)]
pub struct Event {
    pub id: EventId,
    /// Target firing time, in seconds on the clock timeline.
    pub time: f64,
    pub callback: Callback,
    pub args: Vec<Arg>,
}

impl Event {
    /// Calls the callback with `context` followed by the event's args.
    pub(crate) fn invoke(&self, context: &EventContext) {
        (self.callback)(context, &self.args)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("args", &self.args.len())
            .finish_non_exhaustive()
    }
}

/// Lifecycle and queue activity, broadcast to subscribers of a scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// The timer was armed.
    Started,
    /// The timer was disarmed. A reset also emits `Cleared`.
    Stopped { reset: bool },
    /// An event entered the queue.
    Inserted { id: EventId, time: f64 },
    /// An event was removed by id before it fired.
    Removed { id: EventId },
    /// The whole queue was emptied.
    Cleared { count: usize },
    /// An event was dequeued and handed to its callback.
    Dispatched {
        id: EventId,
        time: f64,
        playback_time: f64,
    },
    /// One tick finished draining its window `[t0, t1)`.
    TickProcessed { t0: f64, t1: f64, dispatched: usize },
}
