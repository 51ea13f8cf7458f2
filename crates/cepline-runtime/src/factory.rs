//! Event stream factories
//!
//! Every factory ingests what it produces: detection time is stamped by
//! the factory's clock when the event enters the pipeline, and occurrence
//! time defaults to it. Raw values without an adaptor are stored under
//! [`PAYLOAD`](crate::event::PAYLOAD) in an occurrence typed after the
//! factory.

use crate::error::{CepError, CepResult};
use crate::event::{EventOccurrence, Item, Window};
use crate::scheduler::{Clock, SharedClock, SharedScheduler, SystemClock};
use crate::stream::{lock, Observer, Stream, Subject, Subscriber};
use cepline_core::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

fn payload_event(kind: &'static str, value: Value) -> EventOccurrence {
    EventOccurrence::new(kind, kind).with_payload(value)
}

fn emit_all(
    mut subscriber: Subscriber<Item>,
    clock: &dyn Clock,
    events: impl Iterator<Item = EventOccurrence>,
) {
    for event in events {
        if subscriber.is_closed() {
            return;
        }
        subscriber.next(Item::from(event.ingest(clock.now())));
    }
    subscriber.complete();
}

/// Emit each value as an `"of"` event, then complete.
pub fn of<I, V>(values: I) -> Stream<Item>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    of_with_clock(values, Arc::new(SystemClock))
}

/// [`of`], stamping detection times from `clock`.
pub fn of_with_clock<I, V>(values: I, clock: SharedClock) -> Stream<Item>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let values: Arc<[Value]> = values.into_iter().map(Into::into).collect();
    Stream::new(move |subscriber: Subscriber<Item>| {
        emit_all(
            subscriber,
            clock.as_ref(),
            values.iter().cloned().map(|v| payload_event("of", v)),
        );
    })
}

/// Emit each value through `adaptor`, then complete.
pub fn from_iter<I, V, F>(values: I, adaptor: F) -> Stream<Item>
where
    I: IntoIterator<Item = V>,
    V: Clone + Send + Sync + 'static,
    F: Fn(V) -> EventOccurrence + Send + Sync + 'static,
{
    from_iter_with_clock(values, adaptor, Arc::new(SystemClock))
}

pub fn from_iter_with_clock<I, V, F>(values: I, adaptor: F, clock: SharedClock) -> Stream<Item>
where
    I: IntoIterator<Item = V>,
    V: Clone + Send + Sync + 'static,
    F: Fn(V) -> EventOccurrence + Send + Sync + 'static,
{
    let values: Arc<[V]> = values.into_iter().collect();
    Stream::new(move |subscriber: Subscriber<Item>| {
        emit_all(subscriber, clock.as_ref(), values.iter().cloned().map(&adaptor));
    })
}

/// Emit prepared occurrences, then complete.
pub fn from_events<I>(events: I) -> Stream<Item>
where
    I: IntoIterator<Item = EventOccurrence>,
{
    from_events_with_clock(events, Arc::new(SystemClock))
}

pub fn from_events_with_clock<I>(events: I, clock: SharedClock) -> Stream<Item>
where
    I: IntoIterator<Item = EventOccurrence>,
{
    let events: Arc<[EventOccurrence]> = events.into_iter().collect();
    Stream::new(move |subscriber: Subscriber<Item>| {
        emit_all(subscriber, clock.as_ref(), events.iter().cloned());
    })
}

/// Emit an `"interval"` event every `period`, payload counting from zero.
pub fn interval(period: Duration, scheduler: SharedScheduler) -> CepResult<Stream<Item>> {
    if period.is_zero() {
        return Err(CepError::invalid("interval", "period must be positive"));
    }
    Ok(ticking("interval", period, Some(period), scheduler))
}

/// Emit a `"timer"` event after `delay`, then every `period` if given.
///
/// Without a period the stream completes after its single event.
pub fn timer(
    delay: Duration,
    period: Option<Duration>,
    scheduler: SharedScheduler,
) -> CepResult<Stream<Item>> {
    if period.is_some_and(|p| p.is_zero()) {
        return Err(CepError::invalid("timer", "period must be positive"));
    }
    Ok(ticking("timer", delay, period, scheduler))
}

fn ticking(
    kind: &'static str,
    delay: Duration,
    period: Option<Duration>,
    scheduler: SharedScheduler,
) -> Stream<Item> {
    Stream::new(move |subscriber: Subscriber<Item>| {
        let subscription = subscriber.subscription().clone();
        let sink = Arc::new(Mutex::new(subscriber));
        let clock = Arc::clone(&scheduler);
        let handle = match period {
            Some(period) => {
                let mut tick: i64 = 0;
                scheduler.schedule_repeating(
                    delay,
                    period,
                    Box::new(move || {
                        let event = payload_event(kind, Value::Int(tick)).ingest(clock.now());
                        tick += 1;
                        lock(&sink).next(Item::from(event));
                    }),
                )
            }
            None => scheduler.schedule(
                delay,
                Box::new(move || {
                    let event = payload_event(kind, Value::Int(0)).ingest(clock.now());
                    let mut sink = lock(&sink);
                    sink.next(Item::from(event));
                    sink.complete();
                }),
            ),
        };
        debug!(source = kind, ?delay, ?period, "timer source subscribed");
        subscription.add(move || handle.cancel());
    })
}

/// Hot push handle: every current subscriber sees each pushed item once.
#[derive(Clone)]
pub struct EventSource {
    subject: Subject<Item>,
    clock: SharedClock,
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource {
    pub fn new() -> Self {
        Self {
            subject: Subject::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn stream(&self) -> Stream<Item> {
        self.subject.stream()
    }

    pub fn push(&self, event: EventOccurrence) {
        self.subject.next(Item::from(event.ingest(self.clock.now())));
    }

    /// Push a raw value as a `"from"` event.
    pub fn push_value(&self, value: impl Into<Value>) {
        self.push(payload_event("from", value.into()));
    }

    /// Push an already closed window, for driving pattern stages directly.
    pub fn push_window(&self, window: Window) {
        self.subject.next(Item::Window(window));
    }

    pub fn error(&self, err: CepError) {
        self.subject.error(err)
    }

    pub fn complete(&self) {
        self.subject.complete()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subject.observer_count()
    }
}

impl Observer<EventOccurrence> for EventSource {
    fn next(&mut self, event: EventOccurrence) {
        self.push(event)
    }

    fn error(&mut self, err: CepError) {
        EventSource::error(self, err)
    }

    fn complete(&mut self) {
        EventSource::complete(self)
    }
}
