//! [`SqliteStore`], the SQLite implementation of [`AccommodationStore`].

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use haven_core::{
  event::{EventType, LifecycleEvent},
  model::{Bedspace, Booking, Premises, VoidPeriod},
  store::{AccommodationStore, ChangeSet, CommitOutcome, Scope},
};

use crate::{
  encode::{
    EVENT_COLUMNS, EncodedEvent, RawBedspace, RawBooking, RawEvent, RawPremises,
    RawVoid, encode_booking_status, encode_date, encode_dt, encode_premises_status,
    encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

/// The column a [`Scope`] filters on, and its bound value.
fn scope_filter(scope: Scope) -> (&'static str, String) {
  match scope {
    Scope::Bedspace(id) => ("bedspace_id", encode_uuid(id)),
    Scope::Premises(id) => ("premises_id", encode_uuid(id)),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An accommodation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store. Used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_events(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<LifecycleEvent>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}

// ─── AccommodationStore impl ─────────────────────────────────────────────────

impl AccommodationStore for SqliteStore {
  type Error = Error;

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn get_premises(&self, id: Uuid) -> Result<Option<Premises>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawPremises> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT premises_id, name, status, start_date, end_date, version
             FROM premises WHERE premises_id = ?1",
            rusqlite::params![id_str],
            RawPremises::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPremises::into_premises).transpose()
  }

  async fn get_bedspace(&self, id: Uuid) -> Result<Option<Bedspace>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBedspace> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT bedspace_id, premises_id, reference, start_date, end_date, version
             FROM bedspaces WHERE bedspace_id = ?1",
            rusqlite::params![id_str],
            RawBedspace::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawBedspace::into_bedspace).transpose()
  }

  async fn list_bedspaces(&self, premises_id: Uuid) -> Result<Vec<Bedspace>> {
    let id_str = encode_uuid(premises_id);

    let raws: Vec<RawBedspace> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT bedspace_id, premises_id, reference, start_date, end_date, version
           FROM bedspaces WHERE premises_id = ?1
           ORDER BY reference",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawBedspace::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBedspace::into_bedspace).collect()
  }

  async fn save_premises(&self, premises: Premises) -> Result<()> {
    let id_str     = encode_uuid(premises.id);
    let status_str = encode_premises_status(premises.status);
    let start_str  = encode_date(premises.start_date);
    let end_str    = premises.end_date.map(encode_date);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO premises (premises_id, name, status, start_date, end_date, version)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (premises_id) DO UPDATE SET
             name = excluded.name, status = excluded.status,
             start_date = excluded.start_date, end_date = excluded.end_date,
             version = excluded.version",
          rusqlite::params![
            id_str,
            premises.name,
            status_str,
            start_str,
            end_str,
            premises.version
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_bedspace(&self, bedspace: Bedspace) -> Result<()> {
    let id_str       = encode_uuid(bedspace.id);
    let premises_str = encode_uuid(bedspace.premises_id);
    let start_str    = encode_date(bedspace.start_date);
    let end_str      = bedspace.end_date.map(encode_date);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO bedspaces (bedspace_id, premises_id, reference, start_date, end_date, version)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (bedspace_id) DO UPDATE SET
             premises_id = excluded.premises_id, reference = excluded.reference,
             start_date = excluded.start_date, end_date = excluded.end_date,
             version = excluded.version",
          rusqlite::params![
            id_str,
            premises_str,
            bedspace.reference,
            start_str,
            end_str,
            bedspace.version
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_booking(&self, booking: Booking) -> Result<()> {
    let id_str        = encode_uuid(booking.id);
    let bedspace_str  = encode_uuid(booking.bedspace_id);
    let premises_str  = encode_uuid(booking.premises_id);
    let arrival_str   = encode_date(booking.arrival_date);
    let departure_str = encode_date(booking.departure_date);
    let status_str    = encode_booking_status(booking.status);
    let turnaround    = booking.turnaround_working_days;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO bookings (
             booking_id, bedspace_id, premises_id, arrival_date,
             departure_date, status, turnaround_working_days
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            bedspace_str,
            premises_str,
            arrival_str,
            departure_str,
            status_str,
            turnaround
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_void_period(&self, void: VoidPeriod) -> Result<()> {
    let id_str        = encode_uuid(void.id);
    let bedspace_str  = encode_uuid(void.bedspace_id);
    let premises_str  = encode_uuid(void.premises_id);
    let start_str     = encode_date(void.start_date);
    let end_str       = encode_date(void.end_date);
    let cancelled_str = void.cancelled_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO void_periods (
             void_id, bedspace_id, premises_id, start_date,
             end_date, reason, cancelled_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            bedspace_str,
            premises_str,
            start_str,
            end_str,
            void.reason,
            cancelled_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Commitments ───────────────────────────────────────────────────────────

  async fn find_active_overlapping_bookings(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> Result<Vec<Booking>> {
    let (column, id_str) = scope_filter(scope);
    let from_str = encode_date(from);

    let raws: Vec<RawBooking> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT booking_id, bedspace_id, premises_id, arrival_date,
                  departure_date, status, turnaround_working_days
           FROM bookings
           WHERE {column} = ?1
             AND departure_date >= ?2
             AND status IN ('provisional', 'confirmed', 'arrived')"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, from_str], RawBooking::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBooking::into_booking).collect()
  }

  async fn find_overlapping_voids(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> Result<Vec<VoidPeriod>> {
    let (column, id_str) = scope_filter(scope);
    let from_str = encode_date(from);

    let raws: Vec<RawVoid> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT void_id, bedspace_id, premises_id, start_date,
                  end_date, reason, cancelled_at
           FROM void_periods
           WHERE {column} = ?1
             AND end_date >= ?2
             AND cancelled_at IS NULL"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, from_str], RawVoid::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVoid::into_void).collect()
  }

  // ── Event log ─────────────────────────────────────────────────────────────

  async fn get_event(&self, event_id: Uuid) -> Result<Option<LifecycleEvent>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM lifecycle_events WHERE event_id = ?1");
    Ok(
      self
        .query_events(sql, vec![encode_uuid(event_id)])
        .await?
        .into_iter()
        .next(),
    )
  }

  async fn latest_event(
    &self,
    entity_id: Uuid,
    event_type: EventType,
  ) -> Result<Option<LifecycleEvent>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM lifecycle_events
       WHERE entity_id = ?1 AND event_type = ?2 AND cancelled_at IS NULL
       ORDER BY occurred_at DESC, seq DESC
       LIMIT 1"
    );
    let params = vec![encode_uuid(entity_id), event_type.discriminant().to_owned()];
    Ok(self.query_events(sql, params).await?.into_iter().next())
  }

  async fn events_in_transaction(
    &self,
    transaction_id: Uuid,
  ) -> Result<Vec<LifecycleEvent>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM lifecycle_events
       WHERE transaction_id = ?1
       ORDER BY seq"
    );
    self.query_events(sql, vec![encode_uuid(transaction_id)]).await
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn commit(&self, changes: &ChangeSet) -> Result<CommitOutcome> {
    let premises: Vec<_> = changes
      .premises
      .iter()
      .map(|p| {
        (
          p.id,
          encode_uuid(p.id),
          encode_premises_status(p.status),
          encode_date(p.start_date),
          p.end_date.map(encode_date),
          p.version,
        )
      })
      .collect();
    let bedspaces: Vec<_> = changes
      .bedspaces
      .iter()
      .map(|b| {
        (
          b.id,
          encode_uuid(b.id),
          encode_date(b.start_date),
          b.end_date.map(encode_date),
          b.version,
        )
      })
      .collect();
    let events = changes
      .events
      .iter()
      .map(EncodedEvent::new)
      .collect::<Result<Vec<_>>>()?;
    let guards: Vec<_> = changes
      .guards
      .iter()
      .map(|g| (g.premises_id, encode_uuid(g.premises_id), g.version))
      .collect();
    let cancellations: Vec<_> = changes
      .cancellations
      .iter()
      .map(|c| (encode_uuid(c.event_id), encode_dt(c.cancelled_at)))
      .collect();

    let outcome = self
      .conn
      .call(move |conn| {
        // Returning before `commit` drops the transaction, rolling it back.
        let tx = conn.transaction()?;

        for (id, id_str, status, start, end, version) in &premises {
          let updated = tx.execute(
            "UPDATE premises
             SET status = ?2, start_date = ?3, end_date = ?4, version = version + 1
             WHERE premises_id = ?1 AND version = ?5",
            rusqlite::params![id_str, status, start, end, version],
          )?;
          if updated == 0 {
            return Ok(CommitOutcome::Stale { entity_id: *id });
          }
        }

        for (id, id_str, version) in &guards {
          let updated = tx.execute(
            "UPDATE premises SET version = version + 1
             WHERE premises_id = ?1 AND version = ?2",
            rusqlite::params![id_str, version],
          )?;
          if updated == 0 {
            return Ok(CommitOutcome::Stale { entity_id: *id });
          }
        }

        for (id, id_str, start, end, version) in &bedspaces {
          let updated = tx.execute(
            "UPDATE bedspaces
             SET start_date = ?2, end_date = ?3, version = version + 1
             WHERE bedspace_id = ?1 AND version = ?4",
            rusqlite::params![id_str, start, end, version],
          )?;
          if updated == 0 {
            return Ok(CommitOutcome::Stale { entity_id: *id });
          }
        }

        for e in &events {
          tx.execute(
            "INSERT INTO lifecycle_events (
               event_id, event_type, entity_id, premises_id, transaction_id,
               user_id, occurred_at, details_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
              e.event_id,
              e.event_type,
              e.entity_id,
              e.premises_id,
              e.transaction_id,
              e.user_id,
              e.occurred_at,
              e.details_json,
            ],
          )?;
        }

        for (event_id, cancelled_at) in &cancellations {
          tx.execute(
            "UPDATE lifecycle_events SET cancelled_at = ?2
             WHERE event_id = ?1 AND cancelled_at IS NULL",
            rusqlite::params![event_id, cancelled_at],
          )?;
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed)
      })
      .await?;

    if let CommitOutcome::Stale { entity_id } = outcome {
      debug!(%entity_id, "commit aborted: stored version moved on");
    }
    Ok(outcome)
  }
}
