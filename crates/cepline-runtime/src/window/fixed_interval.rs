//! Fixed calendar-interval windows

use super::{release_on_unsubscribe, FlushPolicy, SharedTimers};
use crate::config::WindowConfig;
use crate::error::{CepError, CepResult};
use crate::event::{Item, SharedEvent};
use crate::predicate::OrderPolicy;
use crate::recurrence::Recurrence;
use crate::scheduler::{Clock, SharedScheduler};
use crate::stream::{lock, Observer, Operator, Stream, Subscriber};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const NAME: &str = "fixed_interval_window";
const OPENER: u64 = u64::MAX;

/// When each recurrence closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalEnd {
    /// A fixed span after each opening
    After(Duration),
    /// An absolute instant; later recurrences keep the same span
    At(DateTime<Utc>),
}

/// Windows covering `[opening, opening + span)` for every recurrence of
/// `start`. Only events whose order-policy timestamp falls inside a
/// window's own bounds are retained by it.
#[derive(Clone)]
pub struct FixedIntervalWindow {
    start: DateTime<Utc>,
    span: TimeDelta,
    recurrence: Recurrence,
    order: OrderPolicy,
    scheduler: SharedScheduler,
    flush: FlushPolicy,
}

pub fn fixed_interval_window(
    start: DateTime<Utc>,
    end: IntervalEnd,
    recurrence: Recurrence,
    order: OrderPolicy,
    scheduler: SharedScheduler,
) -> CepResult<FixedIntervalWindow> {
    let span = match end {
        IntervalEnd::After(d) => TimeDelta::from_std(d)
            .map_err(|_| CepError::invalid(NAME, "interval span is out of range"))?,
        IntervalEnd::At(close) => close.signed_duration_since(start),
    };
    if span <= TimeDelta::zero() {
        return Err(CepError::invalid(NAME, "interval must end after it starts"));
    }
    if start.checked_add_signed(span).is_none() {
        return Err(CepError::invalid(NAME, "interval end is out of range"));
    }
    Ok(FixedIntervalWindow {
        start,
        span,
        recurrence,
        order,
        scheduler,
        flush: FlushPolicy::default(),
    })
}

impl FixedIntervalWindow {
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush = policy;
        self
    }

    pub fn with_config(self, config: &WindowConfig) -> Self {
        self.flush_policy(config.flush_on_complete)
    }

    /// Recurrence index and instant of the first opening whose window has
    /// not entirely passed at `now`.
    fn first_opening(&self, now: DateTime<Utc>) -> (u32, DateTime<Utc>) {
        let (mut n, mut opening) = (0, self.start);
        while self.closing(opening).is_some_and(|close| close <= now) {
            match self.following(n) {
                Some((next, at)) => (n, opening) = (next, at),
                None => break,
            }
        }
        (n, opening)
    }

    fn following(&self, n: u32) -> Option<(u32, DateTime<Utc>)> {
        let next = n.checked_add(1)?;
        Some((next, self.recurrence.nth_opening(self.start, next)?))
    }

    fn closing(&self, opening: DateTime<Utc>) -> Option<DateTime<Utc>> {
        opening.checked_add_signed(self.span)
    }
}

fn delay_until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO)
}

struct Interval {
    id: u64,
    opens_at: DateTime<Utc>,
    closes_at: DateTime<Utc>,
    events: Vec<SharedEvent>,
}

impl Interval {
    fn admits(&self, order: OrderPolicy, event: &SharedEvent) -> bool {
        if order == OrderPolicy::StreamPosition {
            return true;
        }
        match order.timestamp(event) {
            Some(ts) => self.opens_at <= ts && ts < self.closes_at,
            None => false,
        }
    }
}

struct IntervalCore {
    downstream: Subscriber<Item>,
    open: Vec<Interval>,
    next_id: u64,
}

#[derive(Clone)]
struct IntervalContext {
    window: FixedIntervalWindow,
    core: Arc<Mutex<IntervalCore>>,
    timers: SharedTimers,
}

impl IntervalContext {
    /// Open every recurrence due by now starting with recurrence `n` at
    /// `at`, then arm a timer for the next one.
    fn run_openings(&self, mut n: u32, mut at: DateTime<Utc>) {
        let now = self.window.scheduler.now();
        loop {
            if !self.open_at(at, now) {
                return;
            }
            let Some((next, next_at)) = self.window.following(n) else {
                return;
            };
            (n, at) = (next, next_at);
            if at > now {
                let opener = self.clone();
                let handle = self.window.scheduler.schedule(
                    delay_until(now, at),
                    Box::new(move || opener.run_openings(n, at)),
                );
                lock(&self.timers).insert(OPENER, handle);
                return;
            }
        }
    }

    fn open_at(&self, opens_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(closes_at) = self.window.closing(opens_at) else {
            debug!(operator = NAME, %opens_at, "interval end out of range, recurrence stopped");
            return false;
        };
        let mut core = lock(&self.core);
        if core.downstream.is_closed() {
            return false;
        }
        let id = core.next_id;
        core.next_id += 1;
        core.open.push(Interval {
            id,
            opens_at,
            closes_at,
            events: Vec::new(),
        });
        debug!(operator = NAME, window = id, %opens_at, %closes_at, "interval opened");

        let closer = self.clone();
        let handle = self.window.scheduler.schedule(
            delay_until(now, closes_at),
            Box::new(move || closer.close(id)),
        );
        lock(&self.timers).insert(id, handle);
        true
    }

    fn close(&self, id: u64) {
        let mut core = lock(&self.core);
        lock(&self.timers).cancel(id);
        if let Some(pos) = core.open.iter().position(|w| w.id == id) {
            let interval = core.open.remove(pos);
            debug!(operator = NAME, window = id, size = interval.events.len(), "interval closed");
            core.downstream.next(Item::Window(interval.events));
        }
    }
}

impl Operator<Item> for FixedIntervalWindow {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            let timers = SharedTimers::default();
            release_on_unsubscribe(&timers, &parent);

            let ctx = IntervalContext {
                window: self.clone(),
                core: Arc::new(Mutex::new(IntervalCore {
                    downstream,
                    open: Vec::new(),
                    next_id: 0,
                })),
                timers,
            };

            let now = self.scheduler.now();
            let (n, first) = self.first_opening(now);
            if first <= now {
                ctx.run_openings(n, first);
            } else {
                let opener = ctx.clone();
                let handle = self.scheduler.schedule(
                    delay_until(now, first),
                    Box::new(move || opener.run_openings(n, first)),
                );
                lock(&ctx.timers).insert(OPENER, handle);
            }

            source.subscribe_within(FixedIntervalObserver { ctx }, &parent);
        })
    }
}

struct FixedIntervalObserver {
    ctx: IntervalContext,
}

impl Observer<Item> for FixedIntervalObserver {
    fn next(&mut self, item: Item) {
        let order = self.ctx.window.order;
        let mut core = lock(&self.ctx.core);
        match item {
            Item::Event(event) => {
                for interval in core.open.iter_mut() {
                    if interval.admits(order, &event) {
                        interval.events.push(Arc::clone(&event));
                    }
                }
            }
            Item::Window(_) => core
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
