//! Conjunction, disjunction and negation over event types

use super::{PatternOperator, WindowPattern};
use crate::error::{CepError, CepResult};
use crate::event::{SharedEvent, Window};
use crate::predicate::EventTypes;
use std::sync::Arc;

/// Positional predicate over one `all` tuple
pub type TupleAssertion = Arc<dyn Fn(&[SharedEvent]) -> bool + Send + Sync>;

/// One derived event per complete combination of the listed types.
///
/// Participants are grouped by type in order of first appearance in the
/// list. A type listed `k` times contributes chunks of `k` consecutive
/// events of that type. Tuples are the cartesian product of the groups,
/// first group outermost, and only tuples as long as the list survive.
#[derive(Clone)]
pub struct All {
    types: EventTypes,
    output: String,
    assertion: Option<TupleAssertion>,
}

pub fn all<I, S>(types: I, new_type: impl Into<String>) -> CepResult<PatternOperator<All>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let types = EventTypes::new(types);
    if types.len() <= 1 {
        return Err(CepError::EventTypeListTooShort { operator: "all" });
    }
    Ok(PatternOperator::new(All {
        types,
        output: new_type.into(),
        assertion: None,
    }))
}

impl PatternOperator<All> {
    /// Keep only tuples satisfying `assertion`; positions follow the
    /// grouped type order.
    pub fn with_assertion<F>(self, assertion: F) -> Self
    where
        F: Fn(&[SharedEvent]) -> bool + Send + Sync + 'static,
    {
        self.map_pattern(|mut all| {
            all.assertion = Some(Arc::new(assertion));
            all
        })
    }
}

impl All {
    /// Distinct types in first-appearance order with their multiplicity.
    fn groups(&self) -> Vec<(&str, usize)> {
        let mut groups: Vec<(&str, usize)> = Vec::new();
        for ty in self.types.iter() {
            match groups.iter_mut().find(|(seen, _)| *seen == ty) {
                Some((_, k)) => *k += 1,
                None => groups.push((ty, 1)),
            }
        }
        groups
    }
}

impl WindowPattern for All {
    fn source_name(&self) -> &'static str {
        "all"
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let participants = self.types.participants(window);
        let mut tuples: Vec<Window> = vec![Vec::new()];
        for (ty, k) in self.groups() {
            let members: Window = participants
                .iter()
                .filter(|e| e.is_type(ty))
                .cloned()
                .collect();
            let chunks: Vec<&[SharedEvent]> = members.chunks(k).collect();
            tuples = tuples
                .iter()
                .flat_map(|prefix| {
                    chunks.iter().map(move |chunk| {
                        let mut tuple = prefix.clone();
                        tuple.extend_from_slice(chunk);
                        tuple
                    })
                })
                .collect();
            if tuples.is_empty() {
                return Vec::new();
            }
        }
        tuples
            .into_iter()
            .filter(|tuple| tuple.len() == self.types.len())
            .filter(|tuple| self.assertion.as_ref().map_or(true, |f| f(tuple.as_slice())))
            .collect()
    }
}

/// Fires with the first participant in window order.
#[derive(Debug, Clone)]
pub struct Any {
    types: EventTypes,
    output: String,
}

pub fn any<I, S>(types: I, new_type: impl Into<String>) -> PatternOperator<Any>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    PatternOperator::new(Any {
        types: EventTypes::new(types),
        output: new_type.into(),
    })
}

impl WindowPattern for Any {
    fn source_name(&self) -> &'static str {
        "any"
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        window
            .iter()
            .find(|e| self.types.matches(e))
            .map(|first| vec![vec![Arc::clone(first)]])
            .unwrap_or_default()
    }
}

/// Fires, with an empty matching set, when no participant is present.
#[derive(Debug, Clone)]
pub struct Absence {
    types: EventTypes,
    output: String,
}

pub fn absence<I, S>(types: I, new_type: impl Into<String>) -> PatternOperator<Absence>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    PatternOperator::new(Absence {
        types: EventTypes::new(types),
        output: new_type.into(),
    })
}

impl WindowPattern for Absence {
    fn source_name(&self) -> &'static str {
        "absence"
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        if window.iter().any(|e| self.types.matches(e)) {
            Vec::new()
        } else {
            vec![Vec::new()]
        }
    }
}
