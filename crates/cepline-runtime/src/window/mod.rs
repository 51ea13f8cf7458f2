//! Window operators
//!
//! Each operator turns a stream of single events into a stream of closed
//! windows. Every subscription gets its own buffers and timers:
//! - Count windows: tumbling, sliding, hopping
//! - Temporal windows: tumbling, hopping
//! - Fixed calendar intervals with recurrence
//! - Event intervals opened and closed by initiator / terminator events
//! - `group_by`, which re-partitions windows by attribute value

mod count;
mod event_interval;
mod fixed_interval;
mod group;
mod temporal;

pub use count::{
    hopping_count_window, sliding_count_window, tumbling_count_window, CountBuffer,
    CountWindow, CountWindowOperator, HoppingCountWindow, SlidingCountWindow,
};
pub use event_interval::{event_interval_window, EventIntervalWindow};
pub use fixed_interval::{fixed_interval_window, FixedIntervalWindow, IntervalEnd};
pub use group::{group_by, GroupBy};
pub use temporal::{hopping_time_window, tumbling_time_window, TimeWindow};

use crate::scheduler::TimerHandle;
use crate::stream::lock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// What a window operator does with partially filled windows when its
/// upstream completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Drop them.
    #[default]
    Discard,
    /// Emit them before completing.
    EmitPartial,
}

/// Pending timers of one operator subscription, keyed by window id.
///
/// Once cancelled, every handle inserted later is cancelled on arrival.
#[derive(Default)]
pub(crate) struct TimerSet {
    handles: FxHashMap<u64, TimerHandle>,
    closed: bool,
}

pub(crate) type SharedTimers = Arc<Mutex<TimerSet>>;

impl TimerSet {
    pub(crate) fn insert(&mut self, id: u64, handle: TimerHandle) {
        if self.closed {
            handle.cancel();
            return;
        }
        if let Some(previous) = self.handles.insert(id, handle) {
            previous.cancel();
        }
    }

    pub(crate) fn cancel(&mut self, id: u64) {
        if let Some(handle) = self.handles.remove(&id) {
            handle.cancel();
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        self.closed = true;
        for (_, handle) in self.handles.drain() {
            handle.cancel();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Register timer cleanup on a subscription.
pub(crate) fn release_on_unsubscribe(timers: &SharedTimers, subscription: &crate::Subscription) {
    let timers = Arc::clone(timers);
    subscription.add(move || lock(&timers).cancel_all());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_set_cancels_late_inserts() {
        let mut timers = TimerSet::default();
        let early = TimerHandle::new();
        timers.insert(1, early.clone());
        timers.cancel_all();
        assert!(early.is_cancelled());

        let late = TimerHandle::new();
        timers.insert(2, late.clone());
        assert!(late.is_cancelled());
        assert_eq!(timers.len(), 0);
    }

    #[test]
    fn test_timer_set_replaces_and_cancels_previous() {
        let mut timers = TimerSet::default();
        let first = TimerHandle::new();
        let second = TimerHandle::new();
        timers.insert(7, first.clone());
        timers.insert(7, second.clone());
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        timers.cancel(7);
        assert!(second.is_cancelled());
    }
}
