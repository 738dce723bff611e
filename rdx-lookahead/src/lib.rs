//! # Lookahead
//!
//! A lookahead event scheduler for time-stamped callbacks.
//!
//! A coarse, jittery periodic timer is bridged to a fine-grained clock (such
//! as an audio clock) by dispatching callbacks *ahead* of the moment they must
//! take effect. Each callback receives the exact playback time it belongs to,
//! and hands that time on to whatever lower-level system does the real work.
//!
//! ## Core Concepts
//!
//! - **Clock**: An injected, monotonic source of "now" in seconds.
//! - **Timer**: A repeating wake-up (`arm_repeating`/`disarm`). On each firing
//!   the scheduler reads the clock and drains one lookahead window.
//! - **Lookahead window**: `[t0, t0 + ahead_time)`. Every queued event whose
//!   time falls inside it is dispatched in time order; ties keep insertion
//!   order.
//! - **Re-entrancy**: Callbacks receive the scheduler and may insert, remove
//!   or stop while the window is draining. Events inserted inside the window
//!   are picked up by the same drain.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lookahead::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a scheduler on a monotonic clock. The default timer is a
//!     //    tokio interval on the current runtime.
//!     let scheduler = Scheduler::builder(Arc::new(SystemClock::new()))
//!         .config(SchedulerConfig::default())
//!         .build()?;
//!
//!     // 2. A callback that reports the playback time it was dispatched for.
//!     let pulse = callback(|ctx, _args| {
//!         println!("pulse at {:.3}s", ctx.playback_time);
//!     });
//!
//!     // 3. Start the timer and queue a few pulses.
//!     scheduler.start(None)?;
//!     for beat in 0..4u32 {
//!         scheduler.insert(f64::from(beat) * 0.5, pulse.clone(), Vec::new())?;
//!     }
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//!     scheduler.stop(true);
//!     Ok(())
//! }
//! ```

pub const SCHEDULER_NAME: &str = "Lookahead Scheduler";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod config;
pub mod error;
pub mod events;
mod queue;
pub mod scheduler;
pub mod time;
pub mod timer;

/// A prelude module for easy importing of the most common scheduler types.
pub mod prelude {
    pub use crate::common::{EventId, TimerHandle};
    pub use crate::config::SchedulerConfig;
    pub use crate::error::SchedulerError;
    pub use crate::events::{arg, callback, Arg, Callback, Event, EventContext, SchedulerEvent};
    pub use crate::scheduler::{Scheduler, SchedulerBuilder};
    pub use crate::time::{Clock, ManualClock, SystemClock, TimeValue};
    pub use crate::timer::{ManualTimer, Timer, TokioTimer};
}
