//! Calendar recurrence for fixed-interval windows

use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    /// The `n`th opening counted from `start`, which is opening zero.
    ///
    /// Monthly and yearly openings keep the calendar day of `start`, clamped
    /// to the end of shorter months. `None` never reopens. Openings past the
    /// representable range are `None`.
    pub fn nth_opening(&self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        if n == 0 {
            return Some(start);
        }
        match self {
            Recurrence::None => None,
            Recurrence::Daily => start.checked_add_signed(TimeDelta::try_days(i64::from(n))?),
            Recurrence::Weekly => start.checked_add_signed(TimeDelta::try_weeks(i64::from(n))?),
            Recurrence::Monthly => start.checked_add_months(Months::new(n)),
            Recurrence::Yearly => start.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}
