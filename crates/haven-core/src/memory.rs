//! [`MemoryStore`], an in-process [`AccommodationStore`].
//!
//! Backs tests and embedded use. Each call takes a single lock, so a commit
//! is atomic with respect to every other call.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard},
};

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  event::{EventType, LifecycleEvent},
  model::{Bedspace, Booking, Premises, VoidPeriod},
  store::{AccommodationStore, ChangeSet, CommitOutcome, Scope},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("memory store lock poisoned")]
  Poisoned,
}

#[derive(Default)]
struct Inner {
  premises:  HashMap<Uuid, Premises>,
  bedspaces: HashMap<Uuid, Bedspace>,
  bookings:  HashMap<Uuid, Booking>,
  voids:     HashMap<Uuid, VoidPeriod>,
  /// Append order doubles as the recording order.
  events:    Vec<LifecycleEvent>,
}

/// Cloning is cheap; clones share the same underlying maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> Result<MutexGuard<'_, Inner>, MemoryError> {
    self.inner.lock().map_err(|_| MemoryError::Poisoned)
  }

  /// Every recorded event, in recording order.
  pub fn events(&self) -> Result<Vec<LifecycleEvent>, MemoryError> {
    Ok(self.lock()?.events.clone())
  }
}

fn in_scope(scope: Scope, bedspace_id: Uuid, premises_id: Uuid) -> bool {
  match scope {
    Scope::Bedspace(id) => id == bedspace_id,
    Scope::Premises(id) => id == premises_id,
  }
}

fn stale_entity(inner: &Inner, changes: &ChangeSet) -> Option<Uuid> {
  let premises = changes.premises.iter().find(|p| {
    inner
      .premises
      .get(&p.id)
      .is_none_or(|stored| stored.version != p.version)
  });
  if let Some(p) = premises {
    return Some(p.id);
  }

  let guard = changes.guards.iter().find(|g| {
    inner
      .premises
      .get(&g.premises_id)
      .is_none_or(|stored| stored.version != g.version)
  });
  if let Some(g) = guard {
    return Some(g.premises_id);
  }

  changes
    .bedspaces
    .iter()
    .find(|b| {
      inner
        .bedspaces
        .get(&b.id)
        .is_none_or(|stored| stored.version != b.version)
    })
    .map(|b| b.id)
}

impl AccommodationStore for MemoryStore {
  type Error = MemoryError;

  async fn get_premises(&self, id: Uuid) -> Result<Option<Premises>, MemoryError> {
    Ok(self.lock()?.premises.get(&id).cloned())
  }

  async fn get_bedspace(&self, id: Uuid) -> Result<Option<Bedspace>, MemoryError> {
    Ok(self.lock()?.bedspaces.get(&id).cloned())
  }

  async fn list_bedspaces(
    &self,
    premises_id: Uuid,
  ) -> Result<Vec<Bedspace>, MemoryError> {
    let mut bedspaces: Vec<Bedspace> = self
      .lock()?
      .bedspaces
      .values()
      .filter(|b| b.premises_id == premises_id)
      .cloned()
      .collect();
    bedspaces.sort_by(|a, b| a.reference.cmp(&b.reference));
    Ok(bedspaces)
  }

  async fn save_premises(&self, premises: Premises) -> Result<(), MemoryError> {
    self.lock()?.premises.insert(premises.id, premises);
    Ok(())
  }

  async fn save_bedspace(&self, bedspace: Bedspace) -> Result<(), MemoryError> {
    self.lock()?.bedspaces.insert(bedspace.id, bedspace);
    Ok(())
  }

  async fn save_booking(&self, booking: Booking) -> Result<(), MemoryError> {
    self.lock()?.bookings.insert(booking.id, booking);
    Ok(())
  }

  async fn save_void_period(&self, void: VoidPeriod) -> Result<(), MemoryError> {
    self.lock()?.voids.insert(void.id, void);
    Ok(())
  }

  async fn find_active_overlapping_bookings(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> Result<Vec<Booking>, MemoryError> {
    Ok(
      self
        .lock()?
        .bookings
        .values()
        .filter(|b| in_scope(scope, b.bedspace_id, b.premises_id))
        .filter(|b| b.status.is_active() && b.departure_date >= from)
        .cloned()
        .collect(),
    )
  }

  async fn find_overlapping_voids(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> Result<Vec<VoidPeriod>, MemoryError> {
    Ok(
      self
        .lock()?
        .voids
        .values()
        .filter(|v| in_scope(scope, v.bedspace_id, v.premises_id))
        .filter(|v| !v.is_cancelled() && v.end_date >= from)
        .cloned()
        .collect(),
    )
  }

  async fn get_event(
    &self,
    event_id: Uuid,
  ) -> Result<Option<LifecycleEvent>, MemoryError> {
    Ok(self.lock()?.events.iter().find(|e| e.id == event_id).cloned())
  }

  async fn latest_event(
    &self,
    entity_id: Uuid,
    event_type: EventType,
  ) -> Result<Option<LifecycleEvent>, MemoryError> {
    Ok(
      self
        .lock()?
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| {
          e.entity_id() == entity_id
            && e.event_type() == event_type
            && !e.is_cancelled()
        })
        .max_by_key(|(seq, e)| (e.occurred_at, *seq))
        .map(|(_, e)| e.clone()),
    )
  }

  async fn events_in_transaction(
    &self,
    transaction_id: Uuid,
  ) -> Result<Vec<LifecycleEvent>, MemoryError> {
    Ok(
      self
        .lock()?
        .events
        .iter()
        .filter(|e| e.transaction_id == transaction_id)
        .cloned()
        .collect(),
    )
  }

  async fn commit(&self, changes: &ChangeSet) -> Result<CommitOutcome, MemoryError> {
    let mut inner = self.lock()?;

    if let Some(entity_id) = stale_entity(&inner, changes) {
      return Ok(CommitOutcome::Stale { entity_id });
    }

    for p in &changes.premises {
      let mut stored = p.clone();
      stored.version += 1;
      inner.premises.insert(stored.id, stored);
    }
    for b in &changes.bedspaces {
      let mut stored = b.clone();
      stored.version += 1;
      inner.bedspaces.insert(stored.id, stored);
    }
    for g in &changes.guards {
      if let Some(stored) = inner.premises.get_mut(&g.premises_id) {
        stored.version += 1;
      }
    }
    inner.events.extend(changes.events.iter().cloned());
    for c in &changes.cancellations {
      if let Some(event) = inner.events.iter_mut().find(|e| e.id == c.event_id) {
        event.cancelled_at = Some(c.cancelled_at);
      }
    }

    Ok(CommitOutcome::Committed)
  }
}
