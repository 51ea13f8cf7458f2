//! Time-driven windows

use super::{release_on_unsubscribe, FlushPolicy, SharedTimers};
use crate::config::WindowConfig;
use crate::error::{CepError, CepResult};
use crate::event::{Item, SharedEvent};
use crate::scheduler::{add_duration, Clock, SharedScheduler};
use crate::stream::{lock, Observer, Operator, Stream, Subscriber};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const OPENER: u64 = u64::MAX;

/// Windows of `duration` opened every `hop`.
///
/// The first window opens at subscription time. Windows close on the
/// scheduler's clock and are emitted even when empty.
#[derive(Clone)]
pub struct TimeWindow {
    name: &'static str,
    duration: Duration,
    hop: Duration,
    scheduler: SharedScheduler,
    flush: FlushPolicy,
}

pub fn tumbling_time_window(duration: Duration, scheduler: SharedScheduler) -> CepResult<TimeWindow> {
    if duration.is_zero() {
        return Err(CepError::invalid("tumbling_time_window", "duration must be positive"));
    }
    Ok(TimeWindow {
        name: "tumbling_time_window",
        duration,
        hop: duration,
        scheduler,
        flush: FlushPolicy::default(),
    })
}

pub fn hopping_time_window(
    duration: Duration,
    hop: Duration,
    scheduler: SharedScheduler,
) -> CepResult<TimeWindow> {
    if duration.is_zero() {
        return Err(CepError::invalid("hopping_time_window", "duration must be positive"));
    }
    if hop.is_zero() {
        return Err(CepError::invalid("hopping_time_window", "hop must be positive"));
    }
    Ok(TimeWindow {
        name: "hopping_time_window",
        duration,
        hop,
        scheduler,
        flush: FlushPolicy::default(),
    })
}

impl TimeWindow {
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush = policy;
        self
    }

    pub fn with_config(self, config: &WindowConfig) -> Self {
        self.flush_policy(config.flush_on_complete)
    }
}

struct OpenWindow {
    id: u64,
    closes_at: DateTime<Utc>,
    events: Vec<SharedEvent>,
}

struct TimeCore {
    downstream: Subscriber<Item>,
    open: Vec<OpenWindow>,
    next_id: u64,
}

impl TimeCore {
    fn emit(&mut self, window: OpenWindow, name: &'static str) {
        debug!(operator = name, window = window.id, size = window.events.len(), "window closed");
        self.downstream.next(Item::Window(window.events));
    }
}

#[derive(Clone)]
struct TimeContext {
    window: TimeWindow,
    core: Arc<Mutex<TimeCore>>,
    timers: SharedTimers,
}

impl TimeContext {
    fn open_window(&self) {
        let now = self.window.scheduler.now();
        let mut core = lock(&self.core);
        if core.downstream.is_closed() {
            return;
        }
        // Close first so a tumbling boundary never holds two windows.
        while let Some(pos) = core.open.iter().position(|w| w.closes_at <= now) {
            let window = core.open.remove(pos);
            lock(&self.timers).cancel(window.id);
            core.emit(window, self.window.name);
        }

        let id = core.next_id;
        core.next_id += 1;
        core.open.push(OpenWindow {
            id,
            closes_at: add_duration(now, self.window.duration),
            events: Vec::new(),
        });
        debug!(operator = self.window.name, window = id, "window opened");

        let closer = self.clone();
        let handle = self
            .window
            .scheduler
            .schedule(self.window.duration, Box::new(move || closer.close_window(id)));
        lock(&self.timers).insert(id, handle);
    }

    fn close_window(&self, id: u64) {
        let mut core = lock(&self.core);
        lock(&self.timers).cancel(id);
        if let Some(pos) = core.open.iter().position(|w| w.id == id) {
            let window = core.open.remove(pos);
            core.emit(window, self.window.name);
        }
    }
}

impl Operator<Item> for TimeWindow {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            let timers = SharedTimers::default();
            release_on_unsubscribe(&timers, &parent);

            let ctx = TimeContext {
                window: self.clone(),
                core: Arc::new(Mutex::new(TimeCore {
                    downstream,
                    open: Vec::new(),
                    next_id: 0,
                })),
                timers,
            };
            ctx.open_window();

            let opener = ctx.clone();
            let handle = self.scheduler.schedule_repeating(
                self.hop,
                self.hop,
                Box::new(move || opener.open_window()),
            );
            lock(&ctx.timers).insert(OPENER, handle);

            source.subscribe_within(TimeWindowObserver { ctx }, &parent);
        })
    }
}

struct TimeWindowObserver {
    ctx: TimeContext,
}

impl Observer<Item> for TimeWindowObserver {
    fn next(&mut self, item: Item) {
        let mut core = lock(&self.ctx.core);
        match item {
            Item::Event(event) => {
                for window in core.open.iter_mut() {
                    window.events.push(Arc::clone(&event));
                }
            }
            Item::Window(_) => core.downstream.error(CepError::UnexpectedWindow {
                operator: self.ctx.window.name,
            }),
        }
    }

    fn error(&mut self, err: CepError) {
        lock(&self.ctx.core).downstream.error(err);
        lock(&self.ctx.timers).cancel_all();
    }

    fn complete(&mut self) {
        let mut core = lock(&self.ctx.core);
        if self.ctx.window.flush == FlushPolicy::EmitPartial {
            for window in std::mem::take(&mut core.open) {
                core.emit(window, self.ctx.window.name);
            }
        }
        core.downstream.complete();
        drop(core);
        lock(&self.ctx.timers).cancel_all();
    }
}
