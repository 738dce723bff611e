//! Contains common, primitive types used across the scheduler.
//!
//! Distinct ID types keep scheduled events and armed timers from being mixed
//! up at call sites.

use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies one repeating timer armed through a [`Timer`](crate::timer::Timer).
    ///
    /// Handles are only meaningful to the timer that issued them.
    pub struct TimerHandle;
}

/// Uniquely identifies a scheduled event for the lifetime of its `Scheduler`.
///
/// Ids are handed out in strictly increasing order starting at 1 and are never
/// reused, even after the event fires or is removed. They exist only so an
/// event can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
