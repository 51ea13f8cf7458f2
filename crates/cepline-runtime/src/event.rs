//! Event model flowing through every operator

use cepline_core::{Field, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Type alias for IndexMap with FxBuildHasher for faster hashing of attribute names.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// A shared, immutable reference to an occurrence.
///
/// Windows and matching sets hold these, so a derived event references
/// its contributing inputs instead of copying them.
pub type SharedEvent = Arc<EventOccurrence>;

/// A finite, ordered batch of occurrences closed by a window operator.
pub type Window = Vec<SharedEvent>;

/// Attribute name raw source values are stored under when no adaptor is given.
pub const PAYLOAD: &str = "payload";

/// One instance of something happening.
///
/// Fields are only settable while building the value; once wrapped in a
/// [`SharedEvent`] an occurrence is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOccurrence {
    event_type_id: Arc<str>,
    event_source: Arc<str>,
    occurrence_time: Option<DateTime<Utc>>,
    detection_time: Option<DateTime<Utc>>,
    #[serde(default)]
    attributes: FxIndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matching_set: Option<Window>,
}

impl EventOccurrence {
    pub fn new(event_type_id: impl Into<Arc<str>>, event_source: impl Into<Arc<str>>) -> Self {
        Self {
            event_type_id: event_type_id.into(),
            event_source: event_source.into(),
            occurrence_time: None,
            detection_time: None,
            attributes: IndexMap::with_hasher(FxBuildHasher),
            matching_set: None,
        }
    }

    /// Build the output of a pattern operator.
    ///
    /// Occurrence and detection time are both `now`; `matching_set` is the
    /// participant subset that satisfied the pattern.
    pub fn derive(
        event_source: impl Into<Arc<str>>,
        event_type_id: impl Into<Arc<str>>,
        now: DateTime<Utc>,
        matching_set: Window,
    ) -> Self {
        Self {
            event_type_id: event_type_id.into(),
            event_source: event_source.into(),
            occurrence_time: Some(now),
            detection_time: Some(now),
            attributes: IndexMap::with_hasher(FxBuildHasher),
            matching_set: Some(matching_set),
        }
    }

    pub(crate) fn projected(
        event_type_id: impl Into<Arc<str>>,
        occurrence_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        attributes: FxIndexMap<String, Value>,
    ) -> Self {
        Self {
            event_type_id: event_type_id.into(),
            event_source: Arc::from("project"),
            occurrence_time,
            detection_time: Some(now),
            attributes,
            matching_set: None,
        }
    }

    pub fn with_occurrence_time(mut self, ts: DateTime<Utc>) -> Self {
        self.occurrence_time = Some(ts);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(self, value: impl Into<Value>) -> Self {
        self.with_attribute(PAYLOAD, value)
    }

    /// Stamp the engine's observation time at the entry of a pipeline.
    ///
    /// Detection time is only ever set once; an occurrence without its own
    /// occurrence time inherits the detection time.
    pub fn ingest(mut self, now: DateTime<Utc>) -> Self {
        let detected = *self.detection_time.get_or_insert(now);
        self.occurrence_time.get_or_insert(detected);
        self
    }

    pub fn event_type_id(&self) -> &str {
        &self.event_type_id
    }

    pub fn event_source(&self) -> &str {
        &self.event_source
    }

    pub fn occurrence_time(&self) -> Option<DateTime<Utc>> {
        self.occurrence_time
    }

    pub fn detection_time(&self) -> Option<DateTime<Utc>> {
        self.detection_time
    }

    pub fn attributes(&self) -> &FxIndexMap<String, Value> {
        &self.attributes
    }

    pub fn matching_set(&self) -> Option<&[SharedEvent]> {
        self.matching_set.as_deref()
    }

    pub fn is_type(&self, event_type_id: &str) -> bool {
        &*self.event_type_id == event_type_id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn payload(&self) -> Option<&Value> {
        self.get(PAYLOAD)
    }

    /// Resolve a flat or nested attribute reference.
    pub fn get_field(&self, field: &Field) -> Option<&Value> {
        field.resolve_in(|name| self.attributes.get(name))
    }

    pub fn get_float(&self, field: &Field) -> Option<f64> {
        self.get_field(field).and_then(Value::as_float)
    }
}

/// A value travelling between operators: a single occurrence or a closed window.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Event(SharedEvent),
    Window(Window),
}

impl Item {
    pub fn as_event(&self) -> Option<&SharedEvent> {
        match self {
            Item::Event(event) => Some(event),
            Item::Window(_) => None,
        }
    }

    pub fn as_window(&self) -> Option<&[SharedEvent]> {
        match self {
            Item::Window(window) => Some(window),
            Item::Event(_) => None,
        }
    }

    pub fn into_event(self) -> Option<SharedEvent> {
        match self {
            Item::Event(event) => Some(event),
            Item::Window(_) => None,
        }
    }

    pub fn into_window(self) -> Option<Window> {
        match self {
            Item::Window(window) => Some(window),
            Item::Event(_) => None,
        }
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Item::Window(_))
    }
}

impl From<EventOccurrence> for Item {
    fn from(event: EventOccurrence) -> Self {
        Item::Event(Arc::new(event))
    }
}

impl From<SharedEvent> for Item {
    fn from(event: SharedEvent) -> Self {
        Item::Event(event)
    }
}

impl From<Window> for Item {
    fn from(window: Window) -> Self {
        Item::Window(window)
    }
}

/// Location reading event used by the spatial demos and tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReading {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl From<PositionReading> for EventOccurrence {
    fn from(r: PositionReading) -> Self {
        EventOccurrence::new("PositionReading", r.device_id.clone())
            .with_occurrence_time(r.timestamp)
            .with_attribute("device_id", r.device_id)
            .with_attribute(
                "location",
                Value::map([("latitude", r.latitude), ("longitude", r.longitude)]),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cepline_core::PathSegment;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_new_has_no_times() {
        let event = EventOccurrence::new("temperature-reading", "sensor-7");
        assert_eq!(event.event_type_id(), "temperature-reading");
        assert_eq!(event.event_source(), "sensor-7");
        assert!(event.occurrence_time().is_none());
        assert!(event.detection_time().is_none());
        assert!(event.matching_set().is_none());
    }

    #[test]
    fn test_ingest_defaults_occurrence_to_detection() {
        let event = EventOccurrence::new("T", "s").ingest(ts(5));
        assert_eq!(event.detection_time(), Some(ts(5)));
        assert_eq!(event.occurrence_time(), Some(ts(5)));
    }

    #[test]
    fn test_ingest_keeps_producer_occurrence_time() {
        let event = EventOccurrence::new("T", "s")
            .with_occurrence_time(ts(1))
            .ingest(ts(5));
        assert_eq!(event.occurrence_time(), Some(ts(1)));
        assert_eq!(event.detection_time(), Some(ts(5)));
    }

    #[test]
    fn test_ingest_never_restamps_detection() {
        let event = EventOccurrence::new("T", "s").ingest(ts(5)).ingest(ts(9));
        assert_eq!(event.detection_time(), Some(ts(5)));
    }

    #[test]
    fn test_derive_references_matching_set() {
        let input = Arc::new(EventOccurrence::new("A", "s").ingest(ts(0)));
        let derived = EventOccurrence::derive("count", "many-a", ts(3), vec![input.clone()]);
        assert_eq!(derived.event_source(), "count");
        assert_eq!(derived.event_type_id(), "many-a");
        assert_eq!(derived.occurrence_time(), Some(ts(3)));
        assert_eq!(derived.detection_time(), Some(ts(3)));
        let set = derived.matching_set().unwrap();
        assert!(Arc::ptr_eq(&set[0], &input));
    }

    #[test]
    fn test_get_field_nested() {
        let event = EventOccurrence::new("T", "s").with_attribute(
            "gps",
            Value::map([("speed", Value::Float(9.5))]),
        );
        let field = Field::path([PathSegment::key("gps"), PathSegment::key("speed")]);
        assert_eq!(event.get_float(&field), Some(9.5));
        assert_eq!(event.get_float(&Field::from("gps")), None);
    }

    #[test]
    fn test_payload_attribute() {
        let event = EventOccurrence::new("of", "of").with_payload(42i64);
        assert_eq!(event.payload(), Some(&Value::Int(42)));
    }

    #[test]
    fn test_item_accessors() {
        let event: Item = EventOccurrence::new("A", "s").into();
        assert!(event.as_event().is_some());
        assert!(!event.is_window());

        let window: Item = Item::Window(vec![]);
        assert_eq!(window.as_window().map(<[SharedEvent]>::len), Some(0));
        assert!(window.into_event().is_none());
    }

    #[test]
    fn test_position_reading_to_event() {
        let reading = PositionReading {
            device_id: "bus-12".to_string(),
            latitude: 38.72,
            longitude: -9.14,
            timestamp: ts(0),
        };
        let event: EventOccurrence = reading.into();
        assert!(event.is_type("PositionReading"));
        let lat = Field::path([PathSegment::key("location"), PathSegment::key("latitude")]);
        assert_eq!(event.get_float(&lat), Some(38.72));
        assert_eq!(event.occurrence_time(), Some(ts(0)));
    }

    #[test]
    fn test_serialize_camel_case_with_provenance() {
        let input = Arc::new(
            EventOccurrence::new("A", "s")
                .with_attribute("sampled", Value::Timestamp(1_000))
                .ingest(ts(0)),
        );
        let derived = EventOccurrence::derive("any", "seen-a", ts(1), vec![input]);
        let json = serde_json::to_value(&derived).unwrap();
        assert_eq!(json["eventTypeId"], "seen-a");
        assert_eq!(json["matchingSet"][0]["eventTypeId"], "A");

        let back: EventOccurrence = serde_json::from_value(json).unwrap();
        assert_eq!(back, derived);
        assert_eq!(
            back.matching_set().unwrap()[0].get("sampled"),
            Some(&Value::Timestamp(1_000))
        );
    }
}
