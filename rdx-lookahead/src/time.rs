//! Clock sources and time-value coercion.
//!
//! The scheduler never looks a clock up on its own: a [`Clock`] is injected at
//! construction. All times are `f64` seconds on that clock's timeline.

use crate::error::{Result, SchedulerError};
use crate::scheduler::Scheduler;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A read-only source of the current time, in seconds.
///
/// Implementations must be monotonically non-decreasing for as long as a
/// scheduler holds them.
pub trait Clock: Send + Sync {
    fn current_time(&self) -> f64;
}

/// A monotonic wall clock counting seconds since it was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A virtual clock that only moves when told to.
///
/// Used for deterministic tests and offline rendering. Setting a time earlier
/// than the current one is ignored to keep the clock monotonic.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `0.0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock already reading `seconds`.
    pub fn starting_at(seconds: f64) -> Self {
        Self {
            bits: AtomicU64::new(seconds.to_bits()),
        }
    }

    /// Moves the clock forward to `seconds`.
    pub fn set(&self, seconds: f64) {
        self.bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (seconds > f64::from_bits(current)).then_some(seconds.to_bits())
            })
            .ok();
    }

    /// Moves the clock forward by `seconds` and returns the new reading.
    pub fn advance(&self, seconds: f64) -> f64 {
        let next = self.current_time() + seconds.max(0.0);
        self.set(next);
        self.current_time()
    }
}

impl Clock for ManualClock {
    fn current_time(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// A caller-supplied time, before coercion into seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeValue {
    /// Seconds on the scheduler's clock timeline.
    Seconds(f64),
    /// Any other notation; the configured coercion decides what it means.
    Symbolic(String),
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Seconds(s) => write!(f, "{}", s),
            TimeValue::Symbolic(s) => f.write_str(s),
        }
    }
}

impl From<f64> for TimeValue {
    fn from(seconds: f64) -> Self {
        TimeValue::Seconds(seconds)
    }
}

impl From<f32> for TimeValue {
    fn from(seconds: f32) -> Self {
        TimeValue::Seconds(f64::from(seconds))
    }
}

impl From<u32> for TimeValue {
    fn from(seconds: u32) -> Self {
        TimeValue::Seconds(f64::from(seconds))
    }
}

impl From<Duration> for TimeValue {
    fn from(duration: Duration) -> Self {
        TimeValue::Seconds(duration.as_secs_f64())
    }
}

impl From<&str> for TimeValue {
    fn from(text: &str) -> Self {
        TimeValue::Symbolic(text.to_string())
    }
}

impl From<String> for TimeValue {
    fn from(text: String) -> Self {
        TimeValue::Symbolic(text)
    }
}

/// Converts a raw [`TimeValue`] into seconds relative to the scheduler's clock.
///
/// The scheduler is passed in so coercions can read `playback_time` or the
/// configuration. The scheduler's internal lock is not held during the call.
pub type TimeCoercion = Arc<dyn Fn(&TimeValue, &Scheduler) -> Result<f64> + Send + Sync>;

/// Numeric identity coercion. Symbolic values are accepted when they parse as
/// a plain number of seconds.
pub fn numeric_seconds(value: &TimeValue, _scheduler: &Scheduler) -> Result<f64> {
    match value {
        TimeValue::Seconds(s) => Ok(*s),
        TimeValue::Symbolic(text) => {
            text.trim()
                .parse::<f64>()
                .map_err(|_| SchedulerError::InvalidTime {
                    raw: text.clone(),
                })
        }
    }
}
