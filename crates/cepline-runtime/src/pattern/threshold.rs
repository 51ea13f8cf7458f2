//! Cardinality and value thresholds

use super::{satisfies, NumericAssertion, PatternOperator, Reduction, WindowPattern};
use crate::event::{SharedEvent, Window};
use crate::predicate::EventTypes;
use cepline_core::Field;
use std::sync::Arc;

pub type CountAssertion = Arc<dyn Fn(usize) -> bool + Send + Sync>;

/// Asserts over the number of participants, zero included.
#[derive(Clone)]
pub struct Count {
    types: EventTypes,
    assertion: CountAssertion,
    output: String,
}

pub fn count<I, S, F>(types: I, assertion: F, new_type: impl Into<String>) -> PatternOperator<Count>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(usize) -> bool + Send + Sync + 'static,
{
    PatternOperator::new(Count {
        types: EventTypes::new(types),
        assertion: Arc::new(assertion),
        output: new_type.into(),
    })
}

impl WindowPattern for Count {
    fn source_name(&self) -> &'static str {
        "count"
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let participants = self.types.participants(window);
        if (self.assertion)(participants.len()) {
            vec![participants]
        } else {
            Vec::new()
        }
    }
}

/// Reduces a numeric attribute over the participants.
///
/// Participants without a numeric value at `field` do not contribute to
/// the reduction but remain in the matching set. A window with no
/// contributing value reduces to a non-finite number and never matches.
#[derive(Clone)]
pub struct ValueThreshold {
    reduction: Reduction,
    types: EventTypes,
    field: Field,
    assertion: NumericAssertion,
    output: String,
}

fn threshold<I, S, F>(
    reduction: Reduction,
    types: I,
    field: impl Into<Field>,
    assertion: F,
    new_type: impl Into<String>,
) -> PatternOperator<ValueThreshold>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(f64) -> bool + Send + Sync + 'static,
{
    PatternOperator::new(ValueThreshold {
        reduction,
        types: EventTypes::new(types),
        field: field.into(),
        assertion: Arc::new(assertion),
        output: new_type.into(),
    })
}

pub fn value_max<I, S, F>(
    types: I,
    field: impl Into<Field>,
    assertion: F,
    new_type: impl Into<String>,
) -> PatternOperator<ValueThreshold>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(f64) -> bool + Send + Sync + 'static,
{
    threshold(Reduction::Max, types, field, assertion, new_type)
}

pub fn value_min<I, S, F>(
    types: I,
    field: impl Into<Field>,
    assertion: F,
    new_type: impl Into<String>,
) -> PatternOperator<ValueThreshold>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(f64) -> bool + Send + Sync + 'static,
{
    threshold(Reduction::Min, types, field, assertion, new_type)
}

pub fn value_avg<I, S, F>(
    types: I,
    field: impl Into<Field>,
    assertion: F,
    new_type: impl Into<String>,
) -> PatternOperator<ValueThreshold>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(f64) -> bool + Send + Sync + 'static,
{
    threshold(Reduction::Avg, types, field, assertion, new_type)
}

impl ValueThreshold {
    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn field(&self) -> &Field {
        &self.field
    }
}

impl WindowPattern for ValueThreshold {
    fn source_name(&self) -> &'static str {
        match self.reduction {
            Reduction::Max => "value max",
            Reduction::Min => "value min",
            Reduction::Avg => "value average",
        }
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let participants = self.types.participants(window);
        let reduced = self
            .reduction
            .reduce(participants.iter().filter_map(|e| e.get_float(&self.field)));
        if satisfies(reduced, &self.assertion) {
            vec![participants]
        } else {
            Vec::new()
        }
    }
}
