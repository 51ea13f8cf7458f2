//! Participant filtering and ordering policies

use crate::event::{EventOccurrence, SharedEvent, Window};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The event types a pattern operator considers participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypes {
    ids: Vec<Arc<str>>,
}

impl EventTypes {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids.into_iter().map(|s| Arc::from(s.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|id| &**id)
    }

    pub fn matches(&self, event: &EventOccurrence) -> bool {
        self.ids.iter().any(|id| event.is_type(id))
    }

    /// The window's participants, in window order.
    pub fn participants(&self, window: &[SharedEvent]) -> Window {
        window
            .iter()
            .filter(|event| self.matches(event))
            .cloned()
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for EventTypes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        EventTypes::new(iter)
    }
}

/// Predicate testing event-type membership.
pub fn matches_any_of<I, S>(ids: I) -> impl Fn(&EventOccurrence) -> bool + Send + Sync + Clone
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let types = EventTypes::new(ids);
    move |event: &EventOccurrence| types.matches(event)
}

/// Which timestamp sequences a window before order-sensitive evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    #[default]
    OccurrenceTime,
    DetectionTime,
    /// Arrival order; no reordering.
    StreamPosition,
}

impl OrderPolicy {
    pub fn timestamp(&self, event: &EventOccurrence) -> Option<DateTime<Utc>> {
        match self {
            OrderPolicy::OccurrenceTime => event.occurrence_time(),
            OrderPolicy::DetectionTime => event.detection_time(),
            OrderPolicy::StreamPosition => None,
        }
    }

    /// Stable sort by the policy's timestamp; events without one sort first.
    pub fn sort(&self, events: &mut [SharedEvent]) {
        if *self == OrderPolicy::StreamPosition {
            return;
        }
        events.sort_by_key(|event| self.timestamp(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(event_type: &str, secs: i64) -> SharedEvent {
        Arc::new(
            EventOccurrence::new(event_type, "test")
                .with_occurrence_time(Utc.timestamp_opt(secs, 0).unwrap())
                .with_attribute("secs", secs),
        )
    }

    #[test]
    fn test_matches_any_of() {
        let pred = matches_any_of(["A", "B"]);
        assert!(pred(&EventOccurrence::new("A", "s")));
        assert!(pred(&EventOccurrence::new("B", "s")));
        assert!(!pred(&EventOccurrence::new("C", "s")));
    }

    #[test]
    fn test_participants_keep_window_order() {
        let window = vec![at("A", 3), at("C", 1), at("B", 2), at("A", 0)];
        let types = EventTypes::new(["A", "B"]);
        let got: Vec<_> = types
            .participants(&window)
            .iter()
            .map(|e| e.event_type_id().to_string())
            .collect();
        assert_eq!(got, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_sort_by_occurrence_is_stable() {
        let mut events = vec![at("A", 5), at("B", 1), at("C", 5), at("D", 0)];
        OrderPolicy::OccurrenceTime.sort(&mut events);
        let order: Vec<_> = events.iter().map(|e| e.event_type_id()).collect();
        assert_eq!(order, vec!["D", "B", "A", "C"]);
    }

    #[test]
    fn test_stream_position_keeps_arrival_order() {
        let mut events = vec![at("A", 5), at("B", 1)];
        OrderPolicy::StreamPosition.sort(&mut events);
        assert_eq!(events[0].event_type_id(), "A");
        assert!(OrderPolicy::StreamPosition.timestamp(&events[0]).is_none());
    }

    #[test]
    fn test_missing_timestamp_sorts_first() {
        let mut events = vec![at("A", 5), Arc::new(EventOccurrence::new("B", "s"))];
        OrderPolicy::DetectionTime.sort(&mut events);
        assert_eq!(events[0].event_type_id(), "A");
        OrderPolicy::OccurrenceTime.sort(&mut events);
        assert_eq!(events[0].event_type_id(), "B");
    }
}
