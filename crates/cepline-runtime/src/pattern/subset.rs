//! Top and bottom `n` participants by value

use super::{PatternOperator, WindowPattern};
use crate::error::{CepError, CepResult};
use crate::event::{SharedEvent, Window};
use crate::predicate::EventTypes;
use cepline_core::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremity {
    Highest,
    Lowest,
}

/// Selects the `n` participants with the highest or lowest numeric value.
///
/// Participants without a number at `field` are excluded. The matching
/// set is in ascending value order, ties kept in window order, and may be
/// shorter than `n`.
#[derive(Debug, Clone)]
pub struct Subset {
    extremity: Extremity,
    count: usize,
    types: EventTypes,
    field: Field,
    output: String,
}

fn subset<I, S>(
    extremity: Extremity,
    types: I,
    count: usize,
    field: impl Into<Field>,
    new_type: impl Into<String>,
) -> CepResult<PatternOperator<Subset>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let subset = Subset {
        extremity,
        count,
        types: EventTypes::new(types),
        field: field.into(),
        output: new_type.into(),
    };
    if count == 0 {
        return Err(CepError::invalid(
            subset.source_name(),
            "selection size must be positive",
        ));
    }
    Ok(PatternOperator::new(subset))
}

pub fn n_highest_values<I, S>(
    types: I,
    count: usize,
    field: impl Into<Field>,
    new_type: impl Into<String>,
) -> CepResult<PatternOperator<Subset>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    subset(Extremity::Highest, types, count, field, new_type)
}

pub fn n_lowest_values<I, S>(
    types: I,
    count: usize,
    field: impl Into<Field>,
    new_type: impl Into<String>,
) -> CepResult<PatternOperator<Subset>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    subset(Extremity::Lowest, types, count, field, new_type)
}

impl WindowPattern for Subset {
    fn source_name(&self) -> &'static str {
        match self.extremity {
            Extremity::Highest => "n highest values",
            Extremity::Lowest => "n lowest values",
        }
    }

    fn output_type(&self) -> &str {
        &self.output
    }

    fn evaluate(&self, window: &[SharedEvent]) -> Vec<Window> {
        let mut ranked: Vec<(f64, SharedEvent)> = window
            .iter()
            .filter(|e| self.types.matches(e))
            .filter_map(|e| Some((e.get_float(&self.field)?, SharedEvent::clone(e))))
            .filter(|(key, _)| key.is_finite())
            .collect();
        if ranked.is_empty() {
            return Vec::new();
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        let keep = self.count.min(ranked.len());
        let selected = match self.extremity {
            Extremity::Highest => ranked.split_off(ranked.len() - keep),
            Extremity::Lowest => {
                ranked.truncate(keep);
                ranked
            }
        };
        vec![selected.into_iter().map(|(_, e)| e).collect()]
    }
}
