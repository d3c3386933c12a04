//! The `AccommodationStore` trait and the unit of work it commits.
//!
//! The trait is implemented by storage backends (e.g. `haven-store-sqlite`,
//! or [`MemoryStore`](crate::memory::MemoryStore)). The lifecycle engine
//! depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  event::{EventType, LifecycleEvent},
  model::{Bedspace, Booking, Premises, VoidPeriod},
};

// ─── Query scope ─────────────────────────────────────────────────────────────

/// Which bedspaces a commitment query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  Bedspace(Uuid),
  /// Every bedspace of the premises.
  Premises(Uuid),
}

// ─── Unit of work ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCancellation {
  pub event_id:     Uuid,
  pub cancelled_at: DateTime<Utc>,
}

/// A premises whose stored version must still match even though this unit
/// leaves its row unchanged. Committing bumps the version all the same, so
/// two operations deciding on the same premises state cannot both land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PremisesGuard {
  pub premises_id: Uuid,
  pub version:     i64,
}

/// Everything one lifecycle operation writes. A store commits it atomically:
/// either every row lands or none does.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
  /// Updated premises, each carrying the version it was loaded at.
  pub premises:      Vec<Premises>,
  /// Updated bedspaces, each carrying the version it was loaded at.
  pub bedspaces:     Vec<Bedspace>,
  pub events:        Vec<LifecycleEvent>,
  pub cancellations: Vec<EventCancellation>,
  /// Premises read to decide a cascade but not otherwise written.
  pub guards:        Vec<PremisesGuard>,
}

impl ChangeSet {
  pub fn is_empty(&self) -> bool {
    self.premises.is_empty()
      && self.bedspaces.is_empty()
      && self.events.is_empty()
      && self.cancellations.is_empty()
      && self.guards.is_empty()
  }

  /// The pending copy of a bedspace, if this change set already touches it.
  pub fn bedspace_mut(&mut self, id: Uuid) -> Option<&mut Bedspace> {
    self.bedspaces.iter_mut().find(|b| b.id == id)
  }

  pub fn premises_mut(&mut self, id: Uuid) -> Option<&mut Premises> {
    self.premises.iter_mut().find(|p| p.id == id)
  }

  /// Pin `premises` at the version it was read at, unless this unit already
  /// writes it (a written premises is version-checked anyway).
  pub fn guard_premises(&mut self, premises: &Premises) {
    let written = self.premises.iter().any(|p| p.id == premises.id);
    let guarded = self.guards.iter().any(|g| g.premises_id == premises.id);
    if !written && !guarded {
      self.guards.push(PremisesGuard {
        premises_id: premises.id,
        version:     premises.version,
      });
    }
  }

  /// Bump every entity version to match what the store now holds.
  pub(crate) fn mark_committed(&mut self) {
    for p in &mut self.premises {
      p.version += 1;
    }
    for b in &mut self.bedspaces {
      b.version += 1;
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  Committed,
  /// An entity's stored version no longer matched; nothing was written.
  Stale { entity_id: Uuid },
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an accommodation store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccommodationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  fn get_premises(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Premises>, Self::Error>> + Send + '_;

  fn get_bedspace(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Bedspace>, Self::Error>> + Send + '_;

  fn list_bedspaces(
    &self,
    premises_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Bedspace>, Self::Error>> + Send + '_;

  /// Insert or overwrite a premises as given, version included.
  fn save_premises(
    &self,
    premises: Premises,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn save_bedspace(
    &self,
    bedspace: Bedspace,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn save_booking(
    &self,
    booking: Booking,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn save_void_period(
    &self,
    void: VoidPeriod,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Commitments ───────────────────────────────────────────────────────

  /// Provisional, confirmed and arrived bookings in `scope` whose departure
  /// date is on or after `from`.
  fn find_active_overlapping_bookings(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> impl Future<Output = Result<Vec<Booking>, Self::Error>> + Send + '_;

  /// Uncancelled void periods in `scope` ending on or after `from`.
  fn find_overlapping_voids(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> impl Future<Output = Result<Vec<VoidPeriod>, Self::Error>> + Send + '_;

  // ── Event log ─────────────────────────────────────────────────────────

  fn get_event(
    &self,
    event_id: Uuid,
  ) -> impl Future<Output = Result<Option<LifecycleEvent>, Self::Error>> + Send + '_;

  /// The most recent non-cancelled event of `event_type` for an entity.
  fn latest_event(
    &self,
    entity_id: Uuid,
    event_type: EventType,
  ) -> impl Future<Output = Result<Option<LifecycleEvent>, Self::Error>> + Send + '_;

  /// Every event sharing `transaction_id`, cancelled ones included, in the
  /// order they were recorded.
  fn events_in_transaction(
    &self,
    transaction_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LifecycleEvent>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Atomically apply `changes`.
  ///
  /// Each premises and bedspace is written only if its stored version equals
  /// the version it carries; the stored version is then incremented. Guarded
  /// premises are checked and incremented the same way. A single mismatch
  /// aborts the whole unit and yields [`CommitOutcome::Stale`].
  fn commit<'a>(
    &'a self,
    changes: &'a ChangeSet,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + 'a;
}
