//! Working-day arithmetic used to size turnarounds.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

pub trait WorkingDays: Send + Sync {
  /// The date `count` working days after `date`; `count == 0` returns `date`.
  fn add_working_days(&self, date: NaiveDate, count: u32) -> NaiveDate;
}

/// Monday–Friday calendar minus a configured set of holidays.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
  holidays: BTreeSet<NaiveDate>,
}

impl Calendar {
  pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
    Self { holidays: holidays.into_iter().collect() }
  }

  pub fn is_working_day(&self, date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
      && !self.holidays.contains(&date)
  }
}

impl WorkingDays for Calendar {
  fn add_working_days(&self, date: NaiveDate, count: u32) -> NaiveDate {
    let mut current = date;
    let mut remaining = count;
    while remaining > 0 {
      let Some(next) = current.succ_opt() else { break };
      current = next;
      if self.is_working_day(current) {
        remaining -= 1;
      }
    }
    current
  }
}
