//! Business-Day Calendar
//!
//! Settlement dates are computed as trade date plus N business days (T+2 for
//! DVP). The holiday set is reference data loaded from configuration; this
//! module only applies it. Weekends are always non-business days.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::BTreeSet;

use crate::value_objects::TradeDate;

/// Business-day calendar: weekend-aware, with an explicit holiday set.
#[derive(Debug, Clone, Default)]
pub struct BusinessCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl BusinessCalendar {
    /// Calendar with no holidays (weekends only).
    pub fn weekends_only() -> Self {
        Self::default()
    }

    /// Calendar with the given holiday dates.
    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self { holidays: holidays.into_iter().collect() }
    }

    /// True if `date` is a business day.
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Add `n` business days to a trade date.
    ///
    /// Counting starts the day after `from`; the result is always a business
    /// day. `n = 0` returns `from` unchanged even if it is a holiday.
    pub fn add_business_days(&self, from: TradeDate, n: u32) -> TradeDate {
        let mut date = from.as_date();
        let mut remaining = n;
        while remaining > 0 {
            // NaiveDate covers +/- ~262000 years; one-day steps cannot overflow
            // for any date this system handles.
            date = date.checked_add_days(Days::new(1)).unwrap_or(date);
            if self.is_business_day(date) {
                remaining -= 1;
            }
        }
        TradeDate::from_date(date)
    }
}
