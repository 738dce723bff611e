//! The lookahead scheduler: a time-ordered event queue drained in windows.
//!
//! A coarse repeating timer wakes the scheduler every `interval` seconds. Each
//! wake-up reads the clock as `t0` and dispatches every queued event whose time
//! falls in `[t0, t0 + ahead_time)`, so callbacks learn about their exact
//! playback time before it arrives.

use crate::common::{EventId, TimerHandle};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::events::{Arg, Callback, Event, EventContext, SchedulerEvent};
use crate::queue::EventQueue;
use crate::time::{numeric_seconds, Clock, TimeCoercion, TimeValue};
use crate::timer::{Timer, TokioTimer};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A handle to a lookahead scheduler.
///
/// Handles are cheap to clone and all refer to the same queue. Dispatched
/// callbacks receive one as [`EventContext::target`] and may insert, remove or
/// stop through it while the drain is still running. When the last handle is
/// dropped, a still-armed timer is disarmed.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    to_seconds: TimeCoercion,
    state: Mutex<SchedulerState>,
    event_sender: broadcast::Sender<SchedulerEvent>,
}

struct SchedulerState {
    queue: EventQueue,
    next_id: u64,
    playback_time: f64,
    timer_handle: Option<TimerHandle>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().timer_handle.take() {
            self.timer.disarm(handle);
            debug!("Scheduler dropped while running; timer disarmed.");
        }
    }
}

/// Builds a [`Scheduler`] around an injected clock.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    timer: Option<Arc<dyn Timer>>,
    to_seconds: Option<TimeCoercion>,
}

impl SchedulerBuilder {
    /// Replaces the default timing configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `timer` instead of a [`TokioTimer`] on the current runtime.
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Replaces the numeric time coercion used by `insert`.
    pub fn to_seconds<F>(mut self, coerce: F) -> Self
    where
        F: Fn(&TimeValue, &Scheduler) -> Result<f64> + Send + Sync + 'static,
    {
        self.to_seconds = Some(Arc::new(coerce));
        self
    }

    /// Validates the configuration and creates the scheduler, stopped and empty.
    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;
        let timer = match self.timer {
            Some(timer) => timer,
            None => Arc::new(TokioTimer::from_current()?),
        };
        let to_seconds = self
            .to_seconds
            .unwrap_or_else(|| Arc::new(numeric_seconds) as TimeCoercion);
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Scheduler {
            inner: Arc::new(Inner {
                config: self.config,
                clock: self.clock,
                timer,
                to_seconds,
                state: Mutex::new(SchedulerState {
                    queue: EventQueue::new(),
                    next_id: 0,
                    playback_time: 0.0,
                    timer_handle: None,
                }),
                event_sender,
            }),
        })
    }
}

// Lifecycle and the tick/drain algorithm.
impl Scheduler {
    /// Starts building a scheduler that reads time from `clock`.
    pub fn builder(clock: Arc<dyn Clock>) -> SchedulerBuilder {
        SchedulerBuilder {
            config: SchedulerConfig::default(),
            clock,
            timer: None,
            to_seconds: None,
        }
    }

    /// Creates a scheduler with the default numeric time coercion.
    pub fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn Timer>,
    ) -> Result<Self> {
        Self::builder(clock).config(config).timer(timer).build()
    }

    /// Arms the repeating timer unless it is already armed.
    ///
    /// Every firing drains the window starting at the clock's current time. If
    /// `callback` is given it is inserted at time `0`, so it is dispatched on
    /// the first tick.
    pub fn start(&self, callback: Option<Callback>) -> Result<&Self> {
        if !self.is_running() {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let handle = self.inner.timer.arm_repeating(
                self.inner.config.interval_duration(),
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        let scheduler = Scheduler { inner };
                        let t0 = scheduler.current_time();
                        scheduler.process(t0);
                    }
                }),
            );

            let mut state = self.inner.state.lock();
            if state.timer_handle.is_none() {
                state.timer_handle = Some(handle);
                drop(state);
                info!(
                    "Scheduler started: polling every {}s, looking {}s ahead.",
                    self.inner.config.interval, self.inner.config.ahead_time
                );
                self.emit(SchedulerEvent::Started);
            } else {
                // Lost a race with a concurrent start.
                drop(state);
                self.inner.timer.disarm(handle);
            }
        }
        if let Some(callback) = callback {
            self.insert(0.0, callback, Vec::new())?;
        }
        Ok(self)
    }

    /// Disarms the timer if it is armed. With `reset`, also drops every
    /// pending event, due or not.
    pub fn stop(&self, reset: bool) -> &Self {
        let handle = self.inner.state.lock().timer_handle.take();
        if let Some(handle) = handle {
            self.inner.timer.disarm(handle);
            info!("Scheduler stopped (reset: {}).", reset);
            self.emit(SchedulerEvent::Stopped { reset });
        }
        if reset {
            self.clear();
        }
        self
    }

    /// Runs one tick: dispatches every event due before `t0 + ahead_time`.
    ///
    /// The queue front is re-read after every callback, so events a callback
    /// inserts inside the window are dispatched in this same pass, in time
    /// order. `playback_time` follows each dispatch and returns to `t0` once
    /// the window is drained.
    ///
    /// A panicking callback unwinds out of this call; events still due in the
    /// window stay queued for a later tick. [`TokioTimer`] catches the unwind
    /// at its firing, so the timer stays armed and later ticks still run.
    pub fn process(&self, t0: f64) {
        let t1 = t0 + self.inner.config.ahead_time;
        trace!("Processing window [{}, {}).", t0, t1);
        self.inner.state.lock().playback_time = t0;

        let mut dispatched = 0;
        loop {
            let (event, playback_time) = {
                let mut state = self.inner.state.lock();
                let event = match state.queue.pop_due(t1) {
                    Some(event) => event,
                    None => break,
                };
                let playback_time =
                    self.inner.clock.current_time().max(event.time) + self.inner.config.offset_time;
                state.playback_time = playback_time;
                (event, playback_time)
            };

            trace!(
                "Dispatching event {} (time {}) at playback time {}.",
                event.id,
                event.time,
                playback_time
            );
            self.emit(SchedulerEvent::Dispatched {
                id: event.id,
                time: event.time,
                playback_time,
            });
            let context = EventContext {
                target: self.clone(),
                playback_time,
            };
            event.invoke(&context);
            dispatched += 1;
        }

        self.inner.state.lock().playback_time = t0;
        self.emit(SchedulerEvent::TickProcessed { t0, t1, dispatched });
    }
}

// Queue mutation API.
impl Scheduler {
    /// Schedules `callback` to be dispatched with `args` at `time`.
    ///
    /// `time` goes through the configured coercion first; anything that does
    /// not end up a finite number of seconds is rejected with
    /// [`SchedulerError::InvalidTime`]. Times in the past are accepted and
    /// fire on the next tick. Among events with equal times, earlier inserts
    /// fire first.
    pub fn insert(
        &self,
        time: impl Into<TimeValue>,
        callback: Callback,
        args: Vec<Arg>,
    ) -> Result<EventId> {
        let raw = time.into();
        let seconds = (self.inner.to_seconds)(&raw, self)?;
        if !seconds.is_finite() {
            return Err(SchedulerError::InvalidTime {
                raw: raw.to_string(),
            });
        }

        let id = {
            let mut state = self.inner.state.lock();
            state.next_id += 1;
            let id = EventId(state.next_id);
            state.queue.insert(Event {
                id,
                time: seconds,
                callback,
                args,
            });
            id
        };
        debug!("Inserted event {} at {}s.", id, seconds);
        self.emit(SchedulerEvent::Inserted { id, time: seconds });
        Ok(id)
    }

    /// Schedules `callback` one window past the current playback time.
    ///
    /// Called from inside a callback, this lands at or beyond the end of the
    /// window being drained, so it fires on a later tick rather than the
    /// current one.
    pub fn next_tick(&self, callback: Callback, args: Vec<Arg>) -> Result<EventId> {
        let time = self.playback_time() + self.inner.config.ahead_time;
        self.insert(time, callback, args)
    }

    /// Removes the event with `id`, or every pending event when `id` is `None`.
    ///
    /// Unknown and already-fired ids are ignored. Returns `id` unchanged.
    pub fn remove(&self, id: impl Into<Option<EventId>>) -> Option<EventId> {
        let id = id.into();
        match id {
            None => self.clear(),
            Some(id) => {
                let removed = self.inner.state.lock().queue.remove(id);
                if removed {
                    debug!("Removed event {}.", id);
                    self.emit(SchedulerEvent::Removed { id });
                }
            }
        }
        id
    }

    fn clear(&self) {
        let count = self.inner.state.lock().queue.clear();
        debug!("Cleared {} pending event(s).", count);
        self.emit(SchedulerEvent::Cleared { count });
    }
}

// Read-only accessors.
impl Scheduler {
    /// The injected clock's current time, in seconds.
    pub fn current_time(&self) -> f64 {
        self.inner.clock.current_time()
    }

    /// A copy of the pending events, in dispatch order.
    pub fn events(&self) -> Vec<Event> {
        self.inner.state.lock().queue.snapshot()
    }

    /// The scheduler's current notion of "now" on the clock timeline.
    pub fn playback_time(&self) -> f64 {
        self.inner.state.lock().playback_time
    }

    /// Whether the timer is armed.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().timer_handle.is_some()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Subscribes to the [`SchedulerEvent`] stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.event_sender.subscribe()
    }

    fn emit(&self, event: SchedulerEvent) {
        self.inner.event_sender.send(event).ok();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("running", &state.timer_handle.is_some())
            .field("pending", &state.queue.len())
            .field("playback_time", &state.playback_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::callback;
    use crate::time::ManualClock;
    use crate::timer::ManualTimer;

    fn scheduler() -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            Arc::new(ManualClock::new()),
            Arc::new(ManualTimer::new()),
        )
        .unwrap()
    }

    fn noop() -> Callback {
        callback(|_, _| {})
    }

    #[test]
    fn numeric_coercion_accepts_numbers_and_numeric_text() {
        let scheduler = scheduler();
        let half = numeric_seconds(&TimeValue::Seconds(0.5), &scheduler).unwrap();
        let text = numeric_seconds(&TimeValue::from(" 1.25 "), &scheduler).unwrap();
        assert_eq!(half, 0.5);
        assert_eq!(text, 1.25);
        assert!(matches!(
            numeric_seconds(&TimeValue::from("4n"), &scheduler),
            Err(SchedulerError::InvalidTime { .. })
        ));
    }

    #[test]
    fn non_finite_times_are_rejected_without_consuming_an_id() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.insert(f64::NAN, noop(), Vec::new()),
            Err(SchedulerError::InvalidTime { .. })
        ));
        assert!(scheduler.insert("inf", noop(), Vec::new()).is_err());
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.insert(0.1, noop(), Vec::new()).unwrap(), EventId(1));
    }

    #[test]
    fn custom_coercion_sees_the_scheduler() {
        let scheduler = Scheduler::builder(Arc::new(ManualClock::starting_at(2.0)))
            .timer(Arc::new(ManualTimer::new()))
            .to_seconds(|value, scheduler| match value {
                TimeValue::Symbolic(text) if text == "now" => Ok(scheduler.current_time()),
                other => numeric_seconds(other, scheduler),
            })
            .build()
            .unwrap();

        scheduler.insert("now", noop(), Vec::new()).unwrap();
        scheduler.insert(1.0, noop(), Vec::new()).unwrap();
        let times: Vec<f64> = scheduler.events().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 2.0]);
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let config = SchedulerConfig {
            interval: 0.0,
            ..Default::default()
        };
        let result = Scheduler::new(
            config,
            Arc::new(ManualClock::new()),
            Arc::new(ManualTimer::new()),
        );
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn default_timer_requires_a_runtime() {
        let result = Scheduler::builder(Arc::new(ManualClock::new())).build();
        assert!(matches!(result, Err(SchedulerError::NoRuntime)));
    }

    #[test]
    fn ids_are_never_reused() {
        let scheduler = scheduler();
        let first = scheduler.insert(0.1, noop(), Vec::new()).unwrap();
        scheduler.remove(first);
        let second = scheduler.insert(0.1, noop(), Vec::new()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn observers_see_queue_activity() {
        let scheduler = scheduler();
        let mut rx = scheduler.subscribe();

        let id = scheduler.insert(0.02, noop(), Vec::new()).unwrap();
        scheduler.process(0.0);

        assert_eq!(rx.try_recv().unwrap(), SchedulerEvent::Inserted { id, time: 0.02 });
        assert!(matches!(
            rx.try_recv().unwrap(),
            SchedulerEvent::Dispatched { id: dispatched, .. } if dispatched == id
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SchedulerEvent::TickProcessed { dispatched: 1, .. }
        ));
    }
}
