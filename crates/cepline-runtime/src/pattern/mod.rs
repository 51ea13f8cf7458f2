//! Pattern operators over windows
//!
//! A pattern filters a window down to its participants, evaluates its
//! predicate and returns the matching sets that satisfied it. The
//! [`PatternOperator`] stage turns each matching set into a derived event.

pub mod logical;
pub mod modal;
pub mod spatial;
pub mod subset;
pub mod threshold;
pub mod trend;

pub use logical::{absence, all, any, All, Any, Absence};
pub use modal::{always, sometimes, Modal, Quantifier};
pub use spatial::{
    avg_distance, max_distance, min_distance, moving_toward, relative_avg_distance,
    relative_max_distance, relative_min_distance, AbsoluteDistance, MovingToward,
    RelativeDistance,
};
pub use subset::{n_highest_values, n_lowest_values, Subset};
pub use threshold::{count, value_avg, value_max, value_min, Count, ValueThreshold};
pub use trend::{
    decreasing, increasing, mixed, non_decreasing, non_increasing, stable, Trend, TrendFlag,
    TrendState,
};

use crate::error::CepError;
use crate::event::{EventOccurrence, Item, SharedEvent, Window};
use crate::scheduler::{SharedClock, SystemClock};
use crate::stream::{Observer, Operator, Stream, Subscriber};
use std::sync::Arc;
use tracing::{trace, warn};

/// Caller predicate over a reduced numeric value
pub type NumericAssertion = Arc<dyn Fn(f64) -> bool + Send + Sync>;

/// A predicate evaluated over one window at a time.
pub trait WindowPattern: Send + Sync + 'static {
    /// Provenance tag stamped on derived events
    fn source_name(&self) -> &'static str;

    /// Event type of derived events
    fn output_type(&self) -> &str;

    /// Matching sets that satisfied the pattern, one derived event each.
    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window>;
}

/// Numeric reduction used by threshold and distance patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Min,
    Max,
    Avg,
}

impl Reduction {
    /// Reduce from `+inf` (min), `-inf` (max) or to the mean; an empty
    /// average is NaN.
    pub fn reduce<I: IntoIterator<Item = f64>>(&self, values: I) -> f64 {
        match self {
            Reduction::Min => values.into_iter().fold(f64::INFINITY, f64::min),
            Reduction::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            Reduction::Avg => {
                let (sum, n) = values
                    .into_iter()
                    .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
                sum / n as f64
            }
        }
    }
}

/// Only finite reductions reach the caller's assertion.
pub(crate) fn satisfies(value: f64, assertion: &NumericAssertion) -> bool {
    value.is_finite() && assertion(value)
}

/// Stream stage applying a [`WindowPattern`] to every window
pub struct PatternOperator<P> {
    pattern: P,
    clock: SharedClock,
}

impl<P: Clone> Clone for PatternOperator<P> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<P: WindowPattern> PatternOperator<P> {
    pub fn new(pattern: P) -> Self {
        Self {
            pattern,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for the occurrence and detection time of derived events.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn pattern(&self) -> &P {
        &self.pattern
    }

    pub(crate) fn map_pattern(mut self, f: impl FnOnce(P) -> P) -> Self {
        self.pattern = f(self.pattern);
        self
    }

    /// Evaluate one window into its derived events.
    pub fn derive(&self, window: &[SharedEvent]) -> Vec<SharedEvent> {
        derive_all(&self.pattern, self.clock.as_ref(), window)
    }
}

fn derive_all<P: WindowPattern + ?Sized>(
    pattern: &P,
    clock: &dyn crate::scheduler::Clock,
    window: &[SharedEvent],
) -> Vec<SharedEvent> {
    let matches = pattern.evaluate(window);
    trace!(
        pattern = pattern.source_name(),
        window = window.len(),
        matches = matches.len(),
        "window evaluated"
    );
    if matches.is_empty() {
        return Vec::new();
    }
    let now = clock.now();
    matches
        .into_iter()
        .map(|set| {
            Arc::new(EventOccurrence::derive(
                pattern.source_name(),
                pattern.output_type(),
                now,
                set,
            ))
        })
        .collect()
}

impl<P: WindowPattern> Operator<Item> for PatternOperator<P> {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        let pattern = Arc::new(self.pattern);
        let clock = self.clock;
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            source.subscribe_within(
                PatternObserver {
                    pattern: Arc::clone(&pattern),
                    clock: Arc::clone(&clock),
                    downstream,
                },
                &parent,
            );
        })
    }
}

struct PatternObserver<P> {
    pattern: Arc<P>,
    clock: SharedClock,
    downstream: Subscriber<Item>,
}

impl<P: WindowPattern> Observer<Item> for PatternObserver<P> {
    fn next(&mut self, item: Item) {
        match item {
            Item::Window(window) => {
                for event in derive_all(self.pattern.as_ref(), self.clock.as_ref(), &window) {
                    self.downstream.next(Item::Event(event));
                }
            }
            Item::Event(_) => {
                let operator = self.pattern.source_name();
                warn!(pattern = operator, "pattern applied to a stream without a window");
                self.downstream.error(CepError::WindowRequired { operator });
            }
        }
    }

    fn error(&mut self, err: CepError) {
        self.downstream.error(err)
    }

    fn complete(&mut self) {
        self.downstream.complete()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::event::{EventOccurrence, SharedEvent};
    use crate::location::Point;
    use std::sync::Arc;

    pub fn typed(event_type: &str) -> SharedEvent {
        Arc::new(EventOccurrence::new(event_type, "test"))
    }

    pub fn valued(event_type: &str, value: f64) -> SharedEvent {
        Arc::new(EventOccurrence::new(event_type, "test").with_attribute("value", value))
    }

    pub fn located(event_type: &str, point: Point) -> SharedEvent {
        Arc::new(EventOccurrence::new(event_type, "test").with_attribute("location", point))
    }

    pub fn values(set: &[SharedEvent]) -> Vec<f64> {
        set.iter()
            .filter_map(|e| e.get("value").and_then(|v| v.as_float()))
            .collect()
    }
}
