//! Count-based windows

use super::FlushPolicy;
use crate::config::WindowConfig;
use crate::error::{CepError, CepResult};
use crate::event::{Item, SharedEvent, Window};
use crate::stream::{Observer, Operator, Stream, Subscriber};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Buffer state of a count window, cloned fresh for each subscription.
pub trait CountBuffer: Clone + Send + Sync + 'static {
    /// Operator name used in errors and logs
    fn name(&self) -> &'static str;

    /// Add an event, returning the window it completed, if any.
    fn push(&mut self, event: SharedEvent) -> Option<Window>;

    /// Take every partially filled window.
    fn flush(&mut self) -> Vec<Window>;
}

/// Disjoint, contiguous windows of `size` events
#[derive(Debug, Clone)]
pub struct CountWindow {
    size: usize,
    events: Vec<SharedEvent>,
}

impl CountWindow {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            events: Vec::with_capacity(size),
        }
    }

    pub fn current_count(&self) -> usize {
        self.events.len()
    }
}

impl CountBuffer for CountWindow {
    fn name(&self) -> &'static str {
        "tumbling_count_window"
    }

    fn push(&mut self, event: SharedEvent) -> Option<Window> {
        self.events.push(event);
        (self.events.len() >= self.size).then(|| std::mem::take(&mut self.events))
    }

    fn flush(&mut self) -> Vec<Window> {
        let partial = std::mem::take(&mut self.events);
        if partial.is_empty() {
            Vec::new()
        } else {
            vec![partial]
        }
    }
}

/// The last `size` events, after every event once `size` have arrived.
///
/// Shorter prefixes are never emitted, not even on completion.
#[derive(Debug, Clone)]
pub struct SlidingCountWindow {
    size: usize,
    events: VecDeque<SharedEvent>,
}

impl SlidingCountWindow {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            events: VecDeque::with_capacity(size),
        }
    }
}

impl CountBuffer for SlidingCountWindow {
    fn name(&self) -> &'static str {
        "sliding_count_window"
    }

    fn push(&mut self, event: SharedEvent) -> Option<Window> {
        self.events.push_back(event);
        let overflow = self.events.len().saturating_sub(self.size);
        if overflow > 0 {
            self.events.drain(0..overflow);
        }
        (self.events.len() == self.size).then(|| self.events.iter().map(Arc::clone).collect())
    }

    fn flush(&mut self) -> Vec<Window> {
        Vec::new()
    }
}

/// Windows of `size` events opened every `hop` events.
///
/// `hop < size` overlaps windows, `hop > size` drops the events between
/// them.
#[derive(Debug, Clone)]
pub struct HoppingCountWindow {
    size: usize,
    hop: usize,
    seen: usize,
    open: VecDeque<Window>,
}

impl HoppingCountWindow {
    pub fn new(size: usize, hop: usize) -> Self {
        Self {
            size,
            hop,
            seen: 0,
            open: VecDeque::new(),
        }
    }

    pub fn open_windows(&self) -> usize {
        self.open.len()
    }
}

impl CountBuffer for HoppingCountWindow {
    fn name(&self) -> &'static str {
        "hopping_count_window"
    }

    fn push(&mut self, event: SharedEvent) -> Option<Window> {
        if self.seen % self.hop == 0 {
            self.open.push_back(Vec::with_capacity(self.size));
        }
        self.seen = self.seen.wrapping_add(1);
        for window in self.open.iter_mut() {
            window.push(Arc::clone(&event));
        }
        // Windows open in order, so only the oldest can be full.
        match self.open.front() {
            Some(oldest) if oldest.len() >= self.size => self.open.pop_front(),
            _ => None,
        }
    }

    fn flush(&mut self) -> Vec<Window> {
        self.open.drain(..).filter(|w| !w.is_empty()).collect()
    }
}

/// Stream stage driving a [`CountBuffer`]
#[derive(Debug, Clone)]
pub struct CountWindowOperator<B> {
    prototype: B,
    flush: FlushPolicy,
}

impl<B> CountWindowOperator<B> {
    fn new(prototype: B) -> Self {
        Self {
            prototype,
            flush: FlushPolicy::default(),
        }
    }

    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush = policy;
        self
    }

    pub fn with_config(self, config: &WindowConfig) -> Self {
        self.flush_policy(config.flush_on_complete)
    }
}

pub fn tumbling_count_window(size: usize) -> CepResult<CountWindowOperator<CountWindow>> {
    if size == 0 {
        return Err(CepError::invalid("tumbling_count_window", "size must be at least 1"));
    }
    Ok(CountWindowOperator::new(CountWindow::new(size)))
}

pub fn sliding_count_window(size: usize) -> CepResult<CountWindowOperator<SlidingCountWindow>> {
    if size == 0 {
        return Err(CepError::invalid("sliding_count_window", "size must be at least 1"));
    }
    Ok(CountWindowOperator::new(SlidingCountWindow::new(size)))
}

pub fn hopping_count_window(
    size: usize,
    hop: usize,
) -> CepResult<CountWindowOperator<HoppingCountWindow>> {
    if size == 0 {
        return Err(CepError::invalid("hopping_count_window", "size must be at least 1"));
    }
    if hop == 0 {
        return Err(CepError::invalid("hopping_count_window", "hop must be at least 1"));
    }
    Ok(CountWindowOperator::new(HoppingCountWindow::new(size, hop)))
}

impl<B: CountBuffer> Operator<Item> for CountWindowOperator<B> {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            source.subscribe_within(
                CountWindowObserver {
                    buffer: self.prototype.clone(),
                    flush: self.flush,
                    downstream,
                },
                &parent,
            );
        })
    }
}

struct CountWindowObserver<B> {
    buffer: B,
    flush: FlushPolicy,
    downstream: Subscriber<Item>,
}

impl<B: CountBuffer> Observer<Item> for CountWindowObserver<B> {
    fn next(&mut self, item: Item) {
        match item {
            Item::Event(event) => {
                if let Some(window) = self.buffer.push(event) {
                    debug!(operator = self.buffer.name(), size = window.len(), "window closed");
                    self.downstream.next(Item::Window(window));
                }
            }
            Item::Window(_) => self.downstream.error(CepError::UnexpectedWindow {
                operator: self.buffer.name(),
            }),
        }
    }

    fn error(&mut self, err: CepError) {
        self.downstream.error(err)
    }

    fn complete(&mut self) {
        if self.flush == FlushPolicy::EmitPartial {
            for window in self.buffer.flush() {
                debug!(operator = self.buffer.name(), size = window.len(), "partial window flushed");
                self.downstream.next(Item::Window(window));
            }
        }
        self.downstream.complete()
    }
}
