//! The repeating-timer capability that drives a scheduler's ticks.
//!
//! A timer only knows how to call `on_fire` every `period` until disarmed. It
//! carries no payload; the scheduler reads its clock when fired.

use crate::common::TimerHandle;
use crate::error::{Result, SchedulerError};
use parking_lot::Mutex;
use slotmap::SlotMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, trace};

/// The closure a timer invokes on every firing.
pub type TimerCallback = Box<dyn FnMut() + Send>;

/// A narrow capability: arm a repeating callback, disarm it by handle.
pub trait Timer: Send + Sync {
    /// Starts calling `on_fire` every `period`. The first call happens one
    /// full period after arming.
    fn arm_repeating(&self, period: Duration, on_fire: TimerCallback) -> TimerHandle;

    /// Stops a previously armed timer. Unknown or already disarmed handles
    /// are ignored.
    fn disarm(&self, handle: TimerHandle);
}

/// A timer backed by one tokio interval task per armed handle.
pub struct TokioTimer {
    runtime: Handle,
    tasks: Mutex<SlotMap<TimerHandle, broadcast::Sender<()>>>,
}

impl TokioTimer {
    /// Creates a timer that spawns its tasks on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Creates a timer on the runtime the caller is running in.
    pub fn from_current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| SchedulerError::NoRuntime)
    }
}

impl Timer for TokioTimer {
    fn arm_repeating(&self, period: Duration, mut on_fire: TimerCallback) -> TimerHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let handle = self.tasks.lock().insert(shutdown_tx);

        self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    // A send or a dropped sender both mean "stop".
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        // A panicking firing loses only its own tick.
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| on_fire())) {
                            error!(
                                "Timer {:?} callback panicked: {}",
                                handle,
                                panic_message(&*payload)
                            );
                        }
                    }
                }
            }
            trace!("Timer {:?} task exited.", handle);
        });
        handle
    }

    fn disarm(&self, handle: TimerHandle) {
        if let Some(shutdown_tx) = self.tasks.lock().remove(handle) {
            shutdown_tx.send(()).ok();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

struct ArmedTimer {
    period: Duration,
    on_fire: Arc<Mutex<TimerCallback>>,
}

/// A virtual timer that fires only when [`ManualTimer::fire`] is called.
///
/// Paired with [`ManualClock`](crate::time::ManualClock) it makes scheduler
/// behavior fully deterministic.
#[derive(Default)]
pub struct ManualTimer {
    armed: Mutex<SlotMap<TimerHandle, ArmedTimer>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires every armed timer once and returns how many fired.
    ///
    /// Callbacks run without the timer's lock held, so they may arm or disarm.
    /// A timer disarmed by an earlier callback in the same round is skipped.
    pub fn fire(&self) -> usize {
        let pending: Vec<(TimerHandle, Arc<Mutex<TimerCallback>>)> = self
            .armed
            .lock()
            .iter()
            .map(|(handle, armed)| (handle, armed.on_fire.clone()))
            .collect();

        let mut fired = 0;
        for (handle, on_fire) in pending {
            if !self.armed.lock().contains_key(handle) {
                continue;
            }
            let mut callback = on_fire.lock();
            (*callback)();
            fired += 1;
        }
        fired
    }

    /// Number of currently armed timers.
    pub fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }

    /// Periods of the currently armed timers.
    pub fn periods(&self) -> Vec<Duration> {
        self.armed.lock().values().map(|armed| armed.period).collect()
    }
}

impl Timer for ManualTimer {
    fn arm_repeating(&self, period: Duration, on_fire: TimerCallback) -> TimerHandle {
        self.armed.lock().insert(ArmedTimer {
            period,
            on_fire: Arc::new(Mutex::new(on_fire)),
        })
    }

    fn disarm(&self, handle: TimerHandle) {
        self.armed.lock().remove(handle);
    }
}
