//! Monotonic trend detection over a numeric attribute

use super::{PatternOperator, WindowPattern};
use crate::event::{SharedEvent, Window};
use crate::predicate::{EventTypes, OrderPolicy};
use cepline_core::Field;

/// The flag a [`Trend`] pattern emits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendFlag {
    Increasing,
    Decreasing,
    Stable,
    /// The sequence failed to be strictly increasing at least once.
    NonIncreasing,
    /// The sequence failed to be strictly decreasing at least once.
    NonDecreasing,
    Mixed,
}

impl TrendFlag {
    pub fn source_name(&self) -> &'static str {
        match self {
            TrendFlag::Increasing => "increasing",
            TrendFlag::Decreasing => "decreasing",
            TrendFlag::Stable => "stable",
            TrendFlag::NonIncreasing => "non increasing",
            TrendFlag::NonDecreasing => "non decreasing",
            TrendFlag::Mixed => "mixed",
        }
    }
}

/// Accumulator folded over one window.
///
/// Every flag starts true and the comparisons are AND-ed in, so a broken
/// trend never recovers. Zero or one value satisfies every flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendState {
    pub previous: Option<f64>,
    pub stable: bool,
    pub increasing: bool,
    pub decreasing: bool,
    pub mixed: bool,
}

impl Default for TrendState {
    fn default() -> Self {
        Self {
            previous: None,
            stable: true,
            increasing: true,
            decreasing: true,
            mixed: true,
        }
    }
}

impl TrendState {
    pub fn fold<I: IntoIterator<Item = f64>>(values: I) -> Self {
        values.into_iter().fold(Self::default(), Self::step)
    }

    pub fn step(mut self, current: f64) -> Self {
        if let Some(previous) = self.previous {
            self.stable &= previous == current;
            self.increasing &= previous < current;
            self.decreasing &= previous > current;
            self.mixed = !self.stable && !self.increasing && !self.decreasing;
        }
        self.previous = Some(current);
        self
    }

    pub fn holds(&self, flag: TrendFlag) -> bool {
        match flag {
            TrendFlag::Increasing => self.increasing,
            TrendFlag::Decreasing => self.decreasing,
            TrendFlag::Stable => self.stable,
            TrendFlag::NonIncreasing => !self.increasing,
            TrendFlag::NonDecreasing => !self.decreasing,
            TrendFlag::Mixed => self.mixed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trend {
    flag: TrendFlag,
    types: EventTypes,
    field: Field,
    order: OrderPolicy,
    output: String,
}

impl Trend {
    pub fn flag(&self) -> TrendFlag {
        self.flag
    }

    pub fn order(&self) -> OrderPolicy {
        self.order
    }
}

impl PatternOperator<Trend> {
    /// Sort participants by `order` before folding. Defaults to arrival order.
    pub fn with_order(self, order: OrderPolicy) -> Self {
        self.map_pattern(|mut trend| {
            trend.order = order;
            trend
        })
    }
}

fn trend<I, S>(
    flag: TrendFlag,
    types: I,
    field: impl Into<Field>,
    new_type: impl Into<String>,
) -> PatternOperator<Trend>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    PatternOperator::new(Trend {
        flag,
        types: EventTypes::new(types),
        field: field.into(),
        order: OrderPolicy::StreamPosition,
        output: new_type.into(),
    })
}

macro_rules! trend_constructor {
    ($($(#[$doc:meta])* $name:ident => $flag:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<I, S>(
                types: I,
                field: impl Into<Field>,
                new_type: impl Into<String>,
            ) -> PatternOperator<Trend>
            where
                I: IntoIterator<Item = S>,
                S: AsRef<str>,
            {
                trend(TrendFlag::$flag, types, field, new_type)
            }
        )*
    };
}

trend_constructor! {
    /// Every consecutive pair strictly increases.
    increasing => Increasing,
    /// Every consecutive pair strictly decreases.
    decreasing => Decreasing,
    /// Every consecutive pair is equal.
    stable => Stable,
    non_increasing => NonIncreasing,
    non_decreasing => NonDecreasing,
    /// None of stable, increasing or decreasing held over the window.
    mixed => Mixed,
}

impl WindowPattern for Trend {
    fn source_name(&self) -> &'static str {
        self.flag.source_name()
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let mut participants = self.types.participants(window);
        self.order.sort(&mut participants);
        let state = TrendState::fold(participants.iter().filter_map(|e| e.get_float(&self.field)));
        if state.holds(self.flag) {
            vec![participants]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::event::EventOccurrence;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn series(xs: &[f64]) -> Window {
        xs.iter().map(|&x| valued("S", x)).collect()
    }

    fn fires(op: &PatternOperator<Trend>, xs: &[f64]) -> bool {
        !op.derive(&series(xs)).is_empty()
    }

    #[test]
    fn test_broken_increase_never_recovers() {
        assert!(!fires(&increasing(["S"], "value", "up"), &[1.0, 2.0, 1.0, 3.0]));
        assert!(fires(&mixed(["S"], "value", "mixed"), &[1.0, 2.0, 1.0, 3.0]));
        assert!(fires(&increasing(["S"], "value", "up"), &[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_decreasing_and_stable() {
        assert!(fires(&decreasing(["S"], "value", "down"), &[3.0, 2.0, 1.0]));
        assert!(!fires(&decreasing(["S"], "value", "down"), &[3.0, 3.0]));
        assert!(fires(&stable(["S"], "value", "flat"), &[4.0, 4.0, 4.0]));
        assert!(!fires(&mixed(["S"], "value", "mixed"), &[4.0, 4.0, 4.0]));
    }

    #[test]
    fn test_non_increasing_is_not_pairwise() {
        let op = non_increasing(["S"], "value", "not-up");
        assert!(!fires(&op, &[1.0, 2.0, 3.0]));
        // 1 -> 3 -> 2 rises first, yet the strict increase was broken once
        assert!(fires(&op, &[1.0, 3.0, 2.0]));
        // plateaus break strict increase as well
        assert!(fires(&op, &[2.0, 2.0]));
        assert!(!fires(&non_decreasing(["S"], "value", "not-down"), &[3.0, 2.0, 1.0]));
    }

    #[test]
    fn test_short_windows_satisfy_every_flag() {
        for op in [
            increasing(["S"], "value", "x"),
            decreasing(["S"], "value", "x"),
            stable(["S"], "value", "x"),
            mixed(["S"], "value", "x"),
        ] {
            assert!(fires(&op, &[]));
            assert!(fires(&op, &[7.0]));
        }
        assert!(!fires(&non_increasing(["S"], "value", "x"), &[7.0]));
    }

    #[test]
    fn test_order_policy_sorts_before_folding() {
        let at = |secs: i64, x: f64| {
            Arc::new(
                EventOccurrence::new("S", "test")
                    .with_attribute("value", x)
                    .with_occurrence_time(Utc.timestamp_opt(secs, 0).unwrap()),
            )
        };
        let window = vec![at(30, 3.0), at(10, 1.0), at(20, 2.0)];
        let arrival = increasing(["S"], "value", "up");
        assert!(arrival.derive(&window).is_empty());

        let by_time = arrival.with_order(OrderPolicy::OccurrenceTime);
        let derived = by_time.derive(&window);
        assert_eq!(derived.len(), 1);
        assert_eq!(values(derived[0].matching_set().unwrap()), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_non_numeric_skipped_but_kept() {
        let window = vec![valued("S", 1.0), typed("S"), valued("S", 2.0)];
        let derived = increasing(["S"], "value", "up").derive(&window);
        assert_eq!(derived[0].matching_set().map(<[_]>::len), Some(3));
    }
}
