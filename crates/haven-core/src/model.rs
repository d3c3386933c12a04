//! Accommodation inventory: premises, their bedspaces, and the commitments
//! (bookings and void periods) that can block a lifecycle transition.
//!
//! A premises owns its bedspaces; a bedspace refers back to its premises by id
//! only and is resolved through the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::WorkingDays;

// ─── Premises ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PremisesStatus {
  Online,
  Archived,
}

/// A property containing one or more bedspaces.
///
/// `status` is `Archived` exactly when `end_date` is set. All mutation goes
/// through the methods below so the two never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Premises {
  pub id:         Uuid,
  pub name:       String,
  pub status:     PremisesStatus,
  pub start_date: NaiveDate,
  pub end_date:   Option<NaiveDate>,
  /// Optimistic concurrency token; bumped by the store on every commit.
  pub version:    i64,
}

impl Premises {
  pub fn new(name: impl Into<String>, start_date: NaiveDate) -> Self {
    Self {
      id: Uuid::new_v4(),
      name: name.into(),
      status: PremisesStatus::Online,
      start_date,
      end_date: None,
      version: 0,
    }
  }

  pub fn is_archived(&self) -> bool { self.end_date.is_some() }

  pub fn archive(&mut self, end_date: NaiveDate) {
    self.restore(self.start_date, Some(end_date));
  }

  pub fn reopen(&mut self, start_date: NaiveDate) {
    self.restore(start_date, None);
  }

  /// Set both boundary dates at once, deriving `status` from `end_date`.
  pub fn restore(&mut self, start_date: NaiveDate, end_date: Option<NaiveDate>) {
    self.start_date = start_date;
    self.end_date = end_date;
    self.status = if end_date.is_some() {
      PremisesStatus::Archived
    } else {
      PremisesStatus::Online
    };
  }
}

// ─── Bedspace ────────────────────────────────────────────────────────────────

/// A single lettable unit. `end_date` set means archived (or scheduled to be).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bedspace {
  pub id:          Uuid,
  pub premises_id: Uuid,
  pub reference:   String,
  pub start_date:  NaiveDate,
  pub end_date:    Option<NaiveDate>,
  pub version:     i64,
}

impl Bedspace {
  pub fn new(
    premises_id: Uuid,
    reference: impl Into<String>,
    start_date: NaiveDate,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      premises_id,
      reference: reference.into(),
      start_date,
      end_date: None,
      version: 0,
    }
  }

  pub fn is_archived(&self) -> bool { self.end_date.is_some() }
}

// ─── Bookings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
  Provisional,
  Confirmed,
  Arrived,
  Departed,
  Cancelled,
}

impl BookingStatus {
  /// Cancelled and departed bookings never block a transition.
  pub fn is_active(self) -> bool {
    matches!(self, Self::Provisional | Self::Confirmed | Self::Arrived)
  }
}

/// A booking of a bedspace. Owned by collaborators outside this crate; the
/// lifecycle engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
  pub id:                      Uuid,
  pub bedspace_id:             Uuid,
  pub premises_id:             Uuid,
  pub arrival_date:            NaiveDate,
  pub departure_date:          NaiveDate,
  pub status:                  BookingStatus,
  /// Working days after departure before the bedspace is free again.
  pub turnaround_working_days: Option<u32>,
}

impl Booking {
  /// Last day the bedspace is held by this booking, turnaround included.
  pub fn turnaround_end(&self, calendar: &dyn WorkingDays) -> NaiveDate {
    calendar.add_working_days(
      self.departure_date,
      self.turnaround_working_days.unwrap_or(0),
    )
  }
}

// ─── Void periods ────────────────────────────────────────────────────────────

/// A declared span during which a bedspace is deliberately out of use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidPeriod {
  pub id:           Uuid,
  pub bedspace_id:  Uuid,
  pub premises_id:  Uuid,
  pub start_date:   NaiveDate,
  pub end_date:     NaiveDate,
  pub reason:       String,
  pub cancelled_at: Option<DateTime<Utc>>,
}

impl VoidPeriod {
  pub fn is_cancelled(&self) -> bool { self.cancelled_at.is_some() }
}
