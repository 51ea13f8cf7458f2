//! Universal and existential assertions over participants

use super::{PatternOperator, WindowPattern};
use crate::event::{EventOccurrence, SharedEvent, Window};
use crate::predicate::EventTypes;
use std::sync::Arc;

pub type EventAssertion = Arc<dyn Fn(&EventOccurrence) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// Every participant; vacuously true with none
    Always,
    /// At least one participant
    Sometimes,
}

#[derive(Clone)]
pub struct Modal {
    quantifier: Quantifier,
    types: EventTypes,
    assertion: EventAssertion,
    output: String,
}

fn modal<I, S, F>(quantifier: Quantifier, types: I, assertion: F, new_type: impl Into<String>) -> PatternOperator<Modal>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(&EventOccurrence) -> bool + Send + Sync + 'static,
{
    PatternOperator::new(Modal {
        quantifier,
        types: EventTypes::new(types),
        assertion: Arc::new(assertion),
        output: new_type.into(),
    })
}

pub fn always<I, S, F>(types: I, assertion: F, new_type: impl Into<String>) -> PatternOperator<Modal>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(&EventOccurrence) -> bool + Send + Sync + 'static,
{
    modal(Quantifier::Always, types, assertion, new_type)
}

pub fn sometimes<I, S, F>(types: I, assertion: F, new_type: impl Into<String>) -> PatternOperator<Modal>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(&EventOccurrence) -> bool + Send + Sync + 'static,
{
    modal(Quantifier::Sometimes, types, assertion, new_type)
}

impl WindowPattern for Modal {
    fn source_name(&self) -> &'static str {
        match self.quantifier {
            Quantifier::Always => "always",
            Quantifier::Sometimes => "sometimes",
        }
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let participants = self.types.participants(window);
        let holds = |e: &SharedEvent| (self.assertion)(e);
        let satisfied = match self.quantifier {
            Quantifier::Always => participants.iter().all(holds),
            Quantifier::Sometimes => participants.iter().any(holds),
        };
        if satisfied {
            vec![participants]
        } else {
            Vec::new()
        }
    }
}
