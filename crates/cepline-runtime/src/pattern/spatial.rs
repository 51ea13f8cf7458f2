//! Distance patterns over located participants
//!
//! Locations are read through a [`Field`] and decoded with
//! [`Point::from_value`]; participants without a decodable location do not
//! contribute a distance but remain in the matching set.

use super::{satisfies, NumericAssertion, PatternOperator, Reduction, WindowPattern};
use crate::event::{SharedEvent, Window};
use crate::location::{DistanceMetric, Point};
use crate::predicate::{EventTypes, OrderPolicy};
use cepline_core::Field;
use std::sync::Arc;

pub type SharedMetric = Arc<dyn DistanceMetric>;

fn point_of(event: &SharedEvent, field: &Field) -> Option<Point> {
    event.get_field(field).and_then(Point::from_value)
}

/// Reduced distance from a fixed point to every participant
#[derive(Clone)]
pub struct AbsoluteDistance {
    reduction: Reduction,
    types: EventTypes,
    point: Point,
    field: Field,
    metric: SharedMetric,
    assertion: NumericAssertion,
    output: String,
}

fn absolute<I, S, M, F>(
    reduction: Reduction,
    types: I,
    point: Point,
    field: impl Into<Field>,
    metric: M,
    assertion: F,
    new_type: impl Into<String>,
) -> PatternOperator<AbsoluteDistance>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    M: DistanceMetric + 'static,
    F: Fn(f64) -> bool + Send + Sync + 'static,
{
    PatternOperator::new(AbsoluteDistance {
        reduction,
        types: EventTypes::new(types),
        point,
        field: field.into(),
        metric: Arc::new(metric),
        assertion: Arc::new(assertion),
        output: new_type.into(),
    })
}

macro_rules! absolute_constructor {
    ($($name:ident => $reduction:ident),* $(,)?) => {
        $(
            pub fn $name<I, S, M, F>(
                types: I,
                point: Point,
                field: impl Into<Field>,
                metric: M,
                assertion: F,
                new_type: impl Into<String>,
            ) -> PatternOperator<AbsoluteDistance>
            where
                I: IntoIterator<Item = S>,
                S: AsRef<str>,
                M: DistanceMetric + 'static,
                F: Fn(f64) -> bool + Send + Sync + 'static,
            {
                absolute(Reduction::$reduction, types, point, field, metric, assertion, new_type)
            }
        )*
    };
}

absolute_constructor! {
    min_distance => Min,
    max_distance => Max,
    avg_distance => Avg,
}

impl WindowPattern for AbsoluteDistance {
    fn source_name(&self) -> &'static str {
        match self.reduction {
            Reduction::Min => "min distance pattern",
            Reduction::Max => "max distance pattern",
            Reduction::Avg => "average distance pattern",
        }
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let participants = self.types.participants(window);
        let reduced = self.reduction.reduce(
            participants
                .iter()
                .filter_map(|e| point_of(e, &self.field))
                .map(|p| self.metric.distance(&self.point, &p)),
        );
        if satisfies(reduced, &self.assertion) {
            vec![participants]
        } else {
            Vec::new()
        }
    }
}

/// Reduced distance between consecutive participants.
///
/// Only adjacent pairs in (optionally sorted) order are measured, so a
/// farther non-adjacent pair never contributes.
#[derive(Clone)]
pub struct RelativeDistance {
    reduction: Reduction,
    types: EventTypes,
    field: Field,
    metric: SharedMetric,
    assertion: NumericAssertion,
    order: OrderPolicy,
    output: String,
}

fn relative<I, S, M, F>(
    reduction: Reduction,
    types: I,
    field: impl Into<Field>,
    metric: M,
    assertion: F,
    new_type: impl Into<String>,
) -> PatternOperator<RelativeDistance>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    M: DistanceMetric + 'static,
    F: Fn(f64) -> bool + Send + Sync + 'static,
{
    PatternOperator::new(RelativeDistance {
        reduction,
        types: EventTypes::new(types),
        field: field.into(),
        metric: Arc::new(metric),
        assertion: Arc::new(assertion),
        order: OrderPolicy::StreamPosition,
        output: new_type.into(),
    })
}

macro_rules! relative_constructor {
    ($($name:ident => $reduction:ident),* $(,)?) => {
        $(
            pub fn $name<I, S, M, F>(
                types: I,
                field: impl Into<Field>,
                metric: M,
                assertion: F,
                new_type: impl Into<String>,
            ) -> PatternOperator<RelativeDistance>
            where
                I: IntoIterator<Item = S>,
                S: AsRef<str>,
                M: DistanceMetric + 'static,
                F: Fn(f64) -> bool + Send + Sync + 'static,
            {
                relative(Reduction::$reduction, types, field, metric, assertion, new_type)
            }
        )*
    };
}

relative_constructor! {
    relative_min_distance => Min,
    relative_max_distance => Max,
    relative_avg_distance => Avg,
}

impl PatternOperator<RelativeDistance> {
    pub fn with_order(self, order: OrderPolicy) -> Self {
        self.map_pattern(|mut relative| {
            relative.order = order;
            relative
        })
    }
}

impl WindowPattern for RelativeDistance {
    fn source_name(&self) -> &'static str {
        match self.reduction {
            Reduction::Min => "relative min distance pattern",
            Reduction::Max => "relative max distance pattern",
            Reduction::Avg => "relative average distance pattern",
        }
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let mut participants = self.types.participants(window);
        self.order.sort(&mut participants);
        let points: Vec<Point> = participants
            .iter()
            .filter_map(|e| point_of(e, &self.field))
            .collect();
        let reduced = self.reduction.reduce(
            points
                .windows(2)
                .map(|pair| self.metric.distance(&pair[0], &pair[1])),
        );
        if satisfies(reduced, &self.assertion) {
            vec![participants]
        } else {
            Vec::new()
        }
    }
}

/// Fires when the last located participant is closer to `point` than the first.
#[derive(Clone)]
pub struct MovingToward {
    types: EventTypes,
    point: Point,
    field: Field,
    metric: SharedMetric,
    order: OrderPolicy,
    output: String,
}

pub fn moving_toward<I, S, M>(
    types: I,
    point: Point,
    field: impl Into<Field>,
    metric: M,
    new_type: impl Into<String>,
) -> PatternOperator<MovingToward>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    M: DistanceMetric + 'static,
{
    PatternOperator::new(MovingToward {
        types: EventTypes::new(types),
        point,
        field: field.into(),
        metric: Arc::new(metric),
        order: OrderPolicy::StreamPosition,
        output: new_type.into(),
    })
}

impl PatternOperator<MovingToward> {
    pub fn with_order(self, order: OrderPolicy) -> Self {
        self.map_pattern(|mut toward| {
            toward.order = order;
            toward
        })
    }
}

impl WindowPattern for MovingToward {
    fn source_name(&self) -> &'static str {
        "moving toward"
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let mut participants = self.types.participants(window);
        self.order.sort(&mut participants);
        let mut located = participants.iter().filter_map(|e| point_of(e, &self.field));
        let Some(first) = located.next() else {
            return Vec::new();
        };
        let Some(last) = located.last() else {
            return Vec::new();
        };
        let start = self.metric.distance(&self.point, &first);
        let end = self.metric.distance(&self.point, &last);
        if end < start {
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
    use crate::location::Haversine;

    fn planar(a: &Point, b: &Point) -> f64 {
        ((a.latitude - b.latitude).powi(2) + (a.longitude - b.longitude).powi(2)).sqrt()
    }

    fn path(points: &[(f64, f64)]) -> Window {
        points
            .iter()
            .map(|&(lat, lon)| located("V", Point::new(lat, lon)))
            .collect()
    }

    #[test]
    fn test_absolute_distances() {
        let origin = Point::new(0.0, 0.0);
        let window = path(&[(3.0, 4.0), (6.0, 8.0)]);
        let near = min_distance(["V"], origin, "location", planar, |d| d == 5.0, "near");
        let far = max_distance(["V"], origin, "location", planar, |d| d == 10.0, "far");
        let mean = avg_distance(["V"], origin, "location", planar, |d| d == 7.5, "mean");
        assert_eq!(near.derive(&window).len(), 1);
        assert_eq!(far.derive(&window).len(), 1);
        assert_eq!(mean.derive(&window).len(), 1);
        assert_eq!(mean.pattern().source_name(), "average distance pattern");
    }

    #[test]
    fn test_absolute_without_locations() {
        let op = max_distance(["V"], Point::new(0.0, 0.0), "location", planar, |_| true, "x");
        assert!(op.derive(&[]).is_empty());
        assert!(op.derive(&[typed("V")]).is_empty());
    }

    #[test]
    fn test_relative_uses_consecutive_pairs_only() {
        // first and last are farthest apart but never adjacent
        let window = path(&[(0.0, 0.0), (1.0, 1.0), (0.0, 2.0)]);
        let wide = relative_max_distance(["V"], "location", planar, |d| d > 1.5, "wide");
        assert!(wide.derive(&window).is_empty());
        let adjacent = relative_max_distance(["V"], "location", planar, |d| d > 1.4, "adjacent");
        assert_eq!(adjacent.derive(&window).len(), 1);
    }

    #[test]
    fn test_relative_min_and_avg() {
        let window = path(&[(0.0, 0.0), (0.0, 1.0), (0.0, 4.0)]);
        let min = relative_min_distance(["V"], "location", planar, |d| d == 1.0, "x");
        let avg = relative_avg_distance(["V"], "location", planar, |d| d == 2.0, "x");
        assert_eq!(min.derive(&window).len(), 1);
        assert_eq!(avg.derive(&window).len(), 1);
        assert!(min.derive(&path(&[(0.0, 0.0)])).is_empty());
    }

    #[test]
    fn test_moving_toward() {
        let target = Point::new(38.72, -9.14);
        let approaching = path(&[(38.80, -9.30), (38.76, -9.20), (38.73, -9.15)]);
        let op = moving_toward(["V"], target, "location", Haversine::default(), "approach");
        let derived = op.derive(&approaching);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].matching_set().map(<[_]>::len), Some(3));
        assert_eq!(derived[0].event_source(), "moving toward");

        let mut leaving = approaching.clone();
        leaving.reverse();
        assert!(op.derive(&leaving).is_empty());
        assert!(op.derive(&approaching[..1]).is_empty());
    }
}
