//! Conflict scanning: is a proposed boundary date safe?
//!
//! Given the commitments on one or more bedspaces, find the latest date on
//! which one of them still holds the space. The scan is pure; callers fetch
//! the bookings and void periods and pass them in.

use chrono::{Days, NaiveDate};
use uuid::Uuid;

use crate::{
  calendar::WorkingDays,
  model::{Booking, VoidPeriod},
  validation::{Rejection, ValidationCode},
};

/// Why a boundary is blocked. Declaration order is tie-break precedence:
/// when two conflicts free the space on the same day, the greater wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockingCategory {
  ExistingBookings,
  ExistingTurnaround,
  ExistingVoid,
}

impl BlockingCategory {
  pub fn code(self) -> ValidationCode {
    match self {
      Self::ExistingBookings => ValidationCode::ExistingBookings,
      Self::ExistingTurnaround => ValidationCode::ExistingTurnaround,
      Self::ExistingVoid => ValidationCode::ExistingVoid,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
  pub category:      BlockingCategory,
  /// First day the bedspace is actually free.
  pub blocking_date: NaiveDate,
  pub bedspace_id:   Uuid,
  /// The booking or void period responsible.
  pub source_id:     Uuid,
}

impl Conflict {
  pub fn into_rejection(self, path: &'static str) -> Rejection {
    Rejection::entity(
      path,
      self.category.code(),
      self.bedspace_id,
      self.blocking_date,
    )
  }
}

fn day_after(date: NaiveDate) -> NaiveDate {
  date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

fn booking_conflict(
  booking: &Booking,
  boundary: NaiveDate,
  calendar: &dyn WorkingDays,
) -> Option<Conflict> {
  if !booking.status.is_active() {
    return None;
  }

  let held_until = booking.turnaround_end(calendar);
  let category = if booking.departure_date >= boundary {
    BlockingCategory::ExistingBookings
  } else if held_until >= boundary {
    BlockingCategory::ExistingTurnaround
  } else {
    return None;
  };

  Some(Conflict {
    category,
    blocking_date: day_after(held_until),
    bedspace_id: booking.bedspace_id,
    source_id: booking.id,
  })
}

fn void_conflict(void: &VoidPeriod, boundary: NaiveDate) -> Option<Conflict> {
  if void.is_cancelled() || void.end_date < boundary {
    return None;
  }
  Some(Conflict {
    category:      BlockingCategory::ExistingVoid,
    blocking_date: day_after(void.end_date),
    bedspace_id:   void.bedspace_id,
    source_id:     void.id,
  })
}

/// Return the commitment that keeps the space held longest past `boundary`,
/// or `None` if nothing blocks it.
///
/// Inputs may span several bedspaces; the result is the single latest
/// blocking date across all of them.
pub fn scan(
  boundary: NaiveDate,
  bookings: &[Booking],
  voids: &[VoidPeriod],
  calendar: &dyn WorkingDays,
) -> Option<Conflict> {
  let from_bookings = bookings
    .iter()
    .filter_map(|b| booking_conflict(b, boundary, calendar));
  let from_voids = voids.iter().filter_map(|v| void_conflict(v, boundary));

  from_bookings
    .chain(from_voids)
    .max_by_key(|c| (c.blocking_date, c.category))
}
