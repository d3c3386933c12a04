//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Calendar dates are stored as `YYYY-MM-DD`, so string comparison in SQL is
//! date comparison. Timestamps are fixed-width RFC 3339. UUIDs are hyphenated
//! lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use haven_core::{
  event::{EventDetails, LifecycleEvent},
  model::{Bedspace, Booking, BookingStatus, Premises, PremisesStatus, VoidPeriod},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Status enums ────────────────────────────────────────────────────────────

pub fn encode_premises_status(s: PremisesStatus) -> &'static str {
  match s {
    PremisesStatus::Online => "online",
    PremisesStatus::Archived => "archived",
  }
}

pub fn decode_premises_status(s: &str) -> Result<PremisesStatus> {
  match s {
    "online" => Ok(PremisesStatus::Online),
    "archived" => Ok(PremisesStatus::Archived),
    other => Err(Error::UnknownValue { column: "premises.status", value: other.into() }),
  }
}

pub fn encode_booking_status(s: BookingStatus) -> &'static str {
  match s {
    BookingStatus::Provisional => "provisional",
    BookingStatus::Confirmed => "confirmed",
    BookingStatus::Arrived => "arrived",
    BookingStatus::Departed => "departed",
    BookingStatus::Cancelled => "cancelled",
  }
}

pub fn decode_booking_status(s: &str) -> Result<BookingStatus> {
  match s {
    "provisional" => Ok(BookingStatus::Provisional),
    "confirmed" => Ok(BookingStatus::Confirmed),
    "arrived" => Ok(BookingStatus::Arrived),
    "departed" => Ok(BookingStatus::Departed),
    "cancelled" => Ok(BookingStatus::Cancelled),
    other => Err(Error::UnknownValue { column: "bookings.status", value: other.into() }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `premises` row.
pub struct RawPremises {
  pub premises_id: String,
  pub name:        String,
  pub status:      String,
  pub start_date:  String,
  pub end_date:    Option<String>,
  pub version:     i64,
}

impl RawPremises {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      premises_id: row.get(0)?,
      name:        row.get(1)?,
      status:      row.get(2)?,
      start_date:  row.get(3)?,
      end_date:    row.get(4)?,
      version:     row.get(5)?,
    })
  }

  pub fn into_premises(self) -> Result<Premises> {
    Ok(Premises {
      id:         decode_uuid(&self.premises_id)?,
      name:       self.name,
      status:     decode_premises_status(&self.status)?,
      start_date: decode_date(&self.start_date)?,
      end_date:   self.end_date.as_deref().map(decode_date).transpose()?,
      version:    self.version,
    })
  }
}

/// Raw values read directly from a `bedspaces` row.
pub struct RawBedspace {
  pub bedspace_id: String,
  pub premises_id: String,
  pub reference:   String,
  pub start_date:  String,
  pub end_date:    Option<String>,
  pub version:     i64,
}

impl RawBedspace {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      bedspace_id: row.get(0)?,
      premises_id: row.get(1)?,
      reference:   row.get(2)?,
      start_date:  row.get(3)?,
      end_date:    row.get(4)?,
      version:     row.get(5)?,
    })
  }

  pub fn into_bedspace(self) -> Result<Bedspace> {
    Ok(Bedspace {
      id:          decode_uuid(&self.bedspace_id)?,
      premises_id: decode_uuid(&self.premises_id)?,
      reference:   self.reference,
      start_date:  decode_date(&self.start_date)?,
      end_date:    self.end_date.as_deref().map(decode_date).transpose()?,
      version:     self.version,
    })
  }
}

pub struct RawBooking {
  pub booking_id:              String,
  pub bedspace_id:             String,
  pub premises_id:             String,
  pub arrival_date:            String,
  pub departure_date:          String,
  pub status:                  String,
  pub turnaround_working_days: Option<u32>,
}

impl RawBooking {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      booking_id:              row.get(0)?,
      bedspace_id:             row.get(1)?,
      premises_id:             row.get(2)?,
      arrival_date:            row.get(3)?,
      departure_date:          row.get(4)?,
      status:                  row.get(5)?,
      turnaround_working_days: row.get(6)?,
    })
  }

  pub fn into_booking(self) -> Result<Booking> {
    Ok(Booking {
      id:                      decode_uuid(&self.booking_id)?,
      bedspace_id:             decode_uuid(&self.bedspace_id)?,
      premises_id:             decode_uuid(&self.premises_id)?,
      arrival_date:            decode_date(&self.arrival_date)?,
      departure_date:          decode_date(&self.departure_date)?,
      status:                  decode_booking_status(&self.status)?,
      turnaround_working_days: self.turnaround_working_days,
    })
  }
}

pub struct RawVoid {
  pub void_id:      String,
  pub bedspace_id:  String,
  pub premises_id:  String,
  pub start_date:   String,
  pub end_date:     String,
  pub reason:       String,
  pub cancelled_at: Option<String>,
}

impl RawVoid {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      void_id:      row.get(0)?,
      bedspace_id:  row.get(1)?,
      premises_id:  row.get(2)?,
      start_date:   row.get(3)?,
      end_date:     row.get(4)?,
      reason:       row.get(5)?,
      cancelled_at: row.get(6)?,
    })
  }

  pub fn into_void(self) -> Result<VoidPeriod> {
    Ok(VoidPeriod {
      id:           decode_uuid(&self.void_id)?,
      bedspace_id:  decode_uuid(&self.bedspace_id)?,
      premises_id:  decode_uuid(&self.premises_id)?,
      start_date:   decode_date(&self.start_date)?,
      end_date:     decode_date(&self.end_date)?,
      reason:       self.reason,
      cancelled_at: self.cancelled_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read directly from a `lifecycle_events` row.
pub struct RawEvent {
  pub event_id:       String,
  pub event_type:     String,
  pub transaction_id: String,
  pub user_id:        Option<String>,
  pub occurred_at:    String,
  pub details_json:   String,
  pub cancelled_at:   Option<String>,
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "event_id, event_type, transaction_id, user_id, \
                                 occurred_at, details_json, cancelled_at";

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:       row.get(0)?,
      event_type:     row.get(1)?,
      transaction_id: row.get(2)?,
      user_id:        row.get(3)?,
      occurred_at:    row.get(4)?,
      details_json:   row.get(5)?,
      cancelled_at:   row.get(6)?,
    })
  }

  pub fn into_event(self) -> Result<LifecycleEvent> {
    let data: serde_json::Value = serde_json::from_str(&self.details_json)?;
    Ok(LifecycleEvent {
      id:             decode_uuid(&self.event_id)?,
      occurred_at:    decode_dt(&self.occurred_at)?,
      transaction_id: decode_uuid(&self.transaction_id)?,
      user_id:        self.user_id.as_deref().map(decode_uuid).transpose()?,
      details:        EventDetails::from_parts(&self.event_type, data)?,
      cancelled_at:   self.cancelled_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// An event flattened to column values, ready to insert.
pub struct EncodedEvent {
  pub event_id:       String,
  pub event_type:     &'static str,
  pub entity_id:      String,
  pub premises_id:    String,
  pub transaction_id: String,
  pub user_id:        Option<String>,
  pub occurred_at:    String,
  pub details_json:   String,
}

impl EncodedEvent {
  pub fn new(event: &LifecycleEvent) -> Result<Self> {
    Ok(Self {
      event_id:       encode_uuid(event.id),
      event_type:     event.event_type().discriminant(),
      entity_id:      encode_uuid(event.entity_id()),
      premises_id:    encode_uuid(event.details.premises_id()),
      transaction_id: encode_uuid(event.transaction_id),
      user_id:        event.user_id.map(encode_uuid),
      occurred_at:    encode_dt(event.occurred_at),
      details_json:   event.details.to_json()?.to_string(),
    })
  }
}
