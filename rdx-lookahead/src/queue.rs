//! The time-ordered queue of pending events.

use crate::common::EventId;
use crate::events::Event;
use std::collections::VecDeque;

/// Pending events sorted by `time` ascending. Events with equal times keep
/// the order they were inserted in.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Places `event` after every queued event whose time is `<=` its own.
    pub(crate) fn insert(&mut self, event: Event) {
        match self.events.back() {
            Some(last) if last.time > event.time => {
                let index = self.events.partition_point(|queued| queued.time <= event.time);
                self.events.insert(index, event);
            }
            _ => self.events.push_back(event),
        }
    }

    /// Removes the first event with `id`. Returns `false` if there was none.
    pub(crate) fn remove(&mut self, id: EventId) -> bool {
        match self.events.iter().position(|queued| queued.id == id) {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Empties the queue and returns how many events were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    /// Dequeues the front event if its time falls before `t1`.
    pub(crate) fn pop_due(&mut self, t1: f64) -> Option<Event> {
        if self.events.front()?.time < t1 {
            self.events.pop_front()
        } else {
            None
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::callback;
    use proptest::prelude::*;

    fn event(id: u64, time: f64) -> Event {
        Event {
            id: EventId(id),
            time,
            callback: callback(|_, _| {}),
            args: Vec::new(),
        }
    }

    fn ids(queue: &EventQueue) -> Vec<u64> {
        queue.snapshot().iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn inserts_before_the_first_later_event() {
        let mut queue = EventQueue::new();
        queue.insert(event(1, 0.3));
        queue.insert(event(2, 0.1));
        queue.insert(event(3, 0.2));
        queue.insert(event(4, 0.4));
        assert_eq!(ids(&queue), vec![2, 3, 1, 4]);
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let mut queue = EventQueue::new();
        queue.insert(event(1, 0.5));
        queue.insert(event(2, 0.1));
        queue.insert(event(3, 0.1));
        queue.insert(event(4, 0.1));
        assert_eq!(ids(&queue), vec![2, 3, 4, 1]);
    }

    #[test]
    fn remove_takes_exactly_one_and_tolerates_unknown_ids() {
        let mut queue = EventQueue::new();
        queue.insert(event(1, 0.1));
        queue.insert(event(2, 0.2));
        assert!(queue.remove(EventId(1)));
        assert!(!queue.remove(EventId(1)));
        assert!(!queue.remove(EventId(99)));
        assert_eq!(ids(&queue), vec![2]);
    }

    #[test]
    fn pop_due_stops_at_the_window_end() {
        let mut queue = EventQueue::new();
        queue.insert(event(1, 0.05));
        queue.insert(event(2, 0.10));
        queue.insert(event(3, 0.15));
        assert_eq!(queue.pop_due(0.15).map(|e| e.id), Some(EventId(1)));
        assert_eq!(queue.pop_due(0.15).map(|e| e.id), Some(EventId(2)));
        assert!(queue.pop_due(0.15).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
        assert!(queue.pop_due(f64::INFINITY).is_none());
    }

    proptest! {
        #[test]
        fn queue_stays_sorted_and_stable(times in prop::collection::vec(0u8..8, 0..64)) {
            let mut queue = EventQueue::new();
            for (i, t) in times.iter().enumerate() {
                queue.insert(event(i as u64, f64::from(*t) * 0.05));
            }
            let snapshot = queue.snapshot();
            prop_assert_eq!(snapshot.len(), times.len());
            for pair in snapshot.windows(2) {
                prop_assert!(pair[0].time <= pair[1].time);
                if pair[0].time == pair[1].time {
                    prop_assert!(pair[0].id < pair[1].id);
                }
            }
        }
    }
}
