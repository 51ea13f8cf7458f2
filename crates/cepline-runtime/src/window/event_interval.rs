//! Windows opened and closed by events

use super::{release_on_unsubscribe, FlushPolicy, SharedTimers};
use crate::config::WindowConfig;
use crate::error::{CepError, CepResult};
use crate::event::{Item, SharedEvent};
use crate::predicate::EventTypes;
use crate::scheduler::SharedScheduler;
use crate::stream::{lock, Observer, Operator, Stream, Subscriber};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const NAME: &str = "event_interval_window";

/// A window per initiator event, closed by the first terminator that
/// follows it or by its expiry.
///
/// Initiators arriving while windows are open start further, concurrent
/// windows. Without terminators or an expiry a window only closes on
/// completion (and only if the flush policy emits partial windows).
#[derive(Clone)]
pub struct EventIntervalWindow {
    initiators: EventTypes,
    terminators: EventTypes,
    expiry: Option<(Duration, SharedScheduler)>,
    max_open: Option<usize>,
    flush: FlushPolicy,
}

pub fn event_interval_window<I, T, S, U>(initiators: I, terminators: T) -> CepResult<EventIntervalWindow>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    T: IntoIterator<Item = U>,
    U: AsRef<str>,
{
    let initiators = EventTypes::new(initiators);
    if initiators.is_empty() {
        return Err(CepError::invalid(NAME, "at least one initiator type is required"));
    }
    Ok(EventIntervalWindow {
        initiators,
        terminators: EventTypes::new(terminators),
        expiry: None,
        max_open: None,
        flush: FlushPolicy::default(),
    })
}

impl EventIntervalWindow {
    /// Close each window `after` its opening unless a terminator came first.
    pub fn expire_after(mut self, after: Duration, scheduler: SharedScheduler) -> CepResult<Self> {
        if after.is_zero() {
            return Err(CepError::invalid(NAME, "expiration must be positive"));
        }
        self.expiry = Some((after, scheduler));
        Ok(self)
    }

    /// Bound the number of concurrently open windows.
    pub fn max_open(mut self, limit: usize) -> CepResult<Self> {
        if limit == 0 {
            return Err(CepError::invalid(NAME, "max_open must be at least 1"));
        }
        self.max_open = Some(limit);
        Ok(self)
    }

    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush = policy;
        self
    }

    pub fn with_config(mut self, config: &WindowConfig) -> Self {
        self.flush = config.flush_on_complete;
        if let Some(limit) = config.max_open_intervals.filter(|n| *n > 0) {
            self.max_open = Some(limit);
        }
        self
    }
}

struct OpenInterval {
    id: u64,
    /// Events buffered before this window opened
    opened_after: u64,
    events: Vec<SharedEvent>,
}

struct IntervalCore {
    downstream: Subscriber<Item>,
    open: Vec<OpenInterval>,
    next_id: u64,
    seen: u64,
}

#[derive(Clone)]
struct IntervalContext {
    window: EventIntervalWindow,
    core: Arc<Mutex<IntervalCore>>,
    timers: SharedTimers,
}

impl IntervalContext {
    fn open(&self) {
        let mut core = lock(&self.core);
        if core.downstream.is_closed() {
            return;
        }
        if let Some(limit) = self.window.max_open {
            while core.open.len() >= limit {
                let oldest = core.open.remove(0);
                lock(&self.timers).cancel(oldest.id);
                warn!(
                    operator = NAME,
                    window = oldest.id,
                    limit,
                    "too many open intervals, emitting oldest early"
                );
                core.downstream.next(Item::Window(oldest.events));
            }
        }

        let id = core.next_id;
        core.next_id += 1;
        let opened_after = core.seen;
        core.open.push(OpenInterval {
            id,
            opened_after,
            events: Vec::new(),
        });
        debug!(operator = NAME, window = id, open = core.open.len(), "interval opened");

        if let Some((after, scheduler)) = &self.window.expiry {
            let expirer = self.clone();
            let handle = scheduler.schedule(*after, Box::new(move || expirer.expire(id)));
            lock(&self.timers).insert(id, handle);
        }
    }

    fn buffer(&self, event: SharedEvent) {
        let mut core = lock(&self.core);
        core.seen += 1;
        for interval in core.open.iter_mut() {
            interval.events.push(Arc::clone(&event));
        }
    }

    /// Close, in opening order, every window opened before the current event.
    fn terminate(&self) {
        let mut core = lock(&self.core);
        let current = core.seen;
        let (closing, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut core.open)
            .into_iter()
            .partition(|w| w.opened_after < current.saturating_sub(1));
        core.open = remaining;
        for interval in closing {
            lock(&self.timers).cancel(interval.id);
            debug!(operator = NAME, window = interval.id, size = interval.events.len(), "interval terminated");
            core.downstream.next(Item::Window(interval.events));
        }
    }

    fn expire(&self, id: u64) {
        let mut core = lock(&self.core);
        lock(&self.timers).cancel(id);
        if let Some(pos) = core.open.iter().position(|w| w.id == id) {
            let interval = core.open.remove(pos);
            debug!(operator = NAME, window = id, size = interval.events.len(), "interval expired");
            core.downstream.next(Item::Window(interval.events));
        }
    }
}

impl Operator<Item> for EventIntervalWindow {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            let timers = SharedTimers::default();
            release_on_unsubscribe(&timers, &parent);
            if self.terminators.is_empty() && self.expiry.is_none() {
                warn!(operator = NAME, "no terminators and no expiry: windows only close on completion");
            }

            let ctx = IntervalContext {
                window: self.clone(),
                core: Arc::new(Mutex::new(IntervalCore {
                    downstream,
                    open: Vec::new(),
                    next_id: 0,
                    seen: 0,
                })),
                timers,
            };

            // Branch order matters: open, then buffer, then terminate.
            let published = source.clone().publish();
            let shared = published.stream();
            shared.subscribe_within(
                Detector {
                    ctx: ctx.clone(),
                    types: self.initiators.clone(),
                    role: Role::Initiator,
                },
                &parent,
            );
            shared.subscribe_within(Buffer { ctx: ctx.clone() }, &parent);
            shared.subscribe_within(
                Detector {
                    ctx,
                    types: self.terminators.clone(),
                    role: Role::Terminator,
                },
                &parent,
            );
            published.connect_within(&parent);
        })
    }
}

#[derive(Clone, Copy)]
enum Role {
    Initiator,
    Terminator,
}

struct Detector {
    ctx: IntervalContext,
    types: EventTypes,
    role: Role,
}

impl Observer<Item> for Detector {
    fn next(&mut self, item: Item) {
        let Item::Event(event) = item else { return };
        if !self.types.matches(&event) {
            return;
        }
        match self.role {
            Role::Initiator => self.ctx.open(),
            Role::Terminator => self.ctx.terminate(),
        }
    }
}

/// The branch carrying events into open windows and owning terminal signals.
struct Buffer {
    ctx: IntervalContext,
}

impl Observer<Item> for Buffer {
    fn next(&mut self, item: Item) {
        match item {
            Item::Event(event) => self.ctx.buffer(event),
            Item::Window(_) => lock(&self.ctx.core)
                .downstream
                .error(CepError::UnexpectedWindow { operator: NAME }),
        }
    }

    fn error(&mut self, err: CepError) {
        lock(&self.ctx.core).downstream.error(err);
        lock(&self.ctx.timers).cancel_all();
    }

    fn complete(&mut self) {
        let mut core = lock(&self.ctx.core);
        if self.ctx.window.flush == FlushPolicy::EmitPartial {
            for interval in std::mem::take(&mut core.open) {
                core.downstream.next(Item::Window(interval.events));
            }
        }
        core.downstream.complete();
        drop(core);
        lock(&self.ctx.timers).cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventOccurrence;
    use crate::scheduler::VirtualScheduler;
    use crate::stream::{Collector, Subject};
    use chrono::{TimeZone, Utc};

    fn ev(event_type: &str) -> Item {
        Item::from(EventOccurrence::new(event_type, "test"))
    }

    fn windows(out: &Collector<Item>) -> Vec<Vec<String>> {
        out.values()
            .iter()
            .map(|item| {
                item.as_window()
                    .unwrap_or_default()
                    .iter()
                    .map(|e| e.event_type_id().to_string())
                    .collect()
            })
            .collect()
    }

    fn run(op: EventIntervalWindow, events: &[&str]) -> Collector<Item> {
        let subject = Subject::new();
        let out = Collector::new();
        subject.stream().pipe(op).subscribe(out.observer());
        for e in events {
            subject.next(ev(e));
        }
        out
    }

    #[test]
    fn test_initiator_to_terminator_inclusive() {
        let op = event_interval_window(["Start"], ["Stop"]).unwrap();
        let out = run(op, &["x", "Start", "a", "b", "Stop", "c"]);
        assert_eq!(windows(&out), vec![vec!["Start", "a", "b", "Stop"]]);
    }

    #[test]
    fn test_overlapping_windows_share_terminator() {
        let op = event_interval_window(["Start"], ["Stop"]).unwrap();
        let out = run(op, &["Start", "a", "Start", "b", "Stop"]);
        assert_eq!(
            windows(&out),
            vec![vec!["Start", "a", "Start", "b", "Stop"], vec!["Start", "b", "Stop"]]
        );
    }

    #[test]
    fn test_event_both_initiator_and_terminator() {
        let op = event_interval_window(["Mark"], ["Mark"]).unwrap();
        let out = run(op, &["Mark", "a", "Mark", "b"]);
        // second Mark closes the first window and opens a new one
        assert_eq!(windows(&out), vec![vec!["Mark", "a", "Mark"]]);
    }

    #[test]
    fn test_expiry_races_terminator() {
        let clock = VirtualScheduler::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let scheduler: SharedScheduler = Arc::new(clock.clone());
        let op = event_interval_window(["Start"], ["Stop"])
            .unwrap()
            .expire_after(Duration::from_secs(5), scheduler)
            .unwrap();

        let subject = Subject::new();
        let out = Collector::new();
        subject.stream().pipe(op).subscribe(out.observer());
        subject.next(ev("Start"));
        subject.next(ev("a"));
        clock.advance_by(Duration::from_secs(5));
        subject.next(ev("Stop"));
        assert_eq!(windows(&out), vec![vec!["Start", "a"]]);

        subject.next(ev("Start"));
        subject.next(ev("Stop"));
        clock.advance_by(Duration::from_secs(10));
        assert_eq!(windows(&out).len(), 2);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn test_max_open_evicts_oldest() {
        let op = event_interval_window(["Start"], ["Stop"])
            .unwrap()
            .max_open(1)
            .unwrap();
        let out = run(op, &["Start", "a", "Start", "b"]);
        assert_eq!(windows(&out), vec![vec!["Start", "a"]]);
    }

    #[test]
    fn test_partial_flush_on_complete() {
        let subject = Subject::new();
        let out = Collector::new();
        subject
            .stream()
            .pipe(
                event_interval_window(["Start"], Vec::<String>::new())
                    .unwrap()
                    .flush_policy(FlushPolicy::EmitPartial),
            )
            .subscribe(out.observer());
        subject.next(ev("Start"));
        subject.next(ev("a"));
        subject.complete();
        assert_eq!(windows(&out), vec![vec!["Start", "a"]]);
        assert!(out.is_completed());
    }

    #[test]
    fn test_source_emits_once_per_subscription() {
        let emitted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&emitted);
        let source = Stream::new(move |mut subscriber: Subscriber<Item>| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            for t in ["Start", "a", "Stop"] {
                subscriber.next(ev(t));
            }
            subscriber.complete();
        });
        let out = Collector::new();
        source
            .pipe(event_interval_window(["Start"], ["Stop"]).unwrap())
            .subscribe(out.observer());
        assert_eq!(emitted.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(windows(&out), vec![vec!["Start", "a", "Stop"]]);
        assert!(out.is_completed());
    }

    #[test]
    fn test_unsubscribe_releases_source_and_timers() {
        let clock = VirtualScheduler::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let scheduler: SharedScheduler = Arc::new(clock.clone());
        let subject = Subject::<Item>::new();
        let subscription = subject
            .stream()
            .pipe(
                event_interval_window(["Start"], ["Stop"])
                    .unwrap()
                    .expire_after(Duration::from_secs(1), scheduler)
                    .unwrap(),
            )
            .subscribe(Collector::new().observer());
        subject.next(ev("Start"));
        assert_eq!(clock.pending(), 1);
        subscription.unsubscribe();
        assert_eq!(clock.pending(), 0);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_empty_initiators_rejected() {
        assert!(event_interval_window(Vec::<String>::new(), ["Stop"]).is_err());
    }
}
