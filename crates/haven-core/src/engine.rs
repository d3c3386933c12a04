//! [`Engine`] is the entry point tying the store, outbox, clock and calendar
//! together. Bedspace and premises operations live in
//! [`crate::bedspace`] and [`crate::premises`].

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  bedspace::BedspaceLifecycle,
  calendar::{Calendar, WorkingDays},
  clock::{Clock, SystemClock},
  conflict::{self, Conflict},
  event::{EventDetails, EventType, LifecycleEvent},
  model::{Bedspace, Premises},
  outbox::{EventBus, EventOutbox},
  premises::PremisesLifecycle,
  store::{AccommodationStore, ChangeSet, CommitOutcome, EventCancellation, Scope},
  validation::{Outcome, Rejection},
};

fn default_lookback() -> u32 { 60 }

/// Tunables for the lifecycle rules.
#[derive(Debug, Clone, Deserialize)]
pub struct Rules {
  /// How many days before a candidate boundary to look for departures whose
  /// turnaround might still extend past it.
  #[serde(default = "default_lookback")]
  pub turnaround_lookback_days: u32,
}

impl Default for Rules {
  fn default() -> Self {
    Self { turnaround_lookback_days: default_lookback() }
  }
}

/// What an applied operation changed, with entities at their new versions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
  pub transaction_id:   Uuid,
  pub premises:         Vec<Premises>,
  pub bedspaces:        Vec<Bedspace>,
  pub events:           Vec<LifecycleEvent>,
  pub cancelled_events: Vec<Uuid>,
}

pub struct Engine<S, B> {
  store:    S,
  outbox:   EventOutbox<B>,
  clock:    Arc<dyn Clock>,
  calendar: Arc<dyn WorkingDays>,
  rules:    Rules,
}

impl<S, B> Engine<S, B>
where
  S: AccommodationStore,
  B: EventBus,
{
  pub fn new(store: S, outbox: EventOutbox<B>) -> Self {
    Self {
      store,
      outbox,
      clock: Arc::new(SystemClock),
      calendar: Arc::new(Calendar::default()),
      rules: Rules::default(),
    }
  }

  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn with_calendar(mut self, calendar: impl WorkingDays + 'static) -> Self {
    self.calendar = Arc::new(calendar);
    self
  }

  pub fn with_rules(mut self, rules: Rules) -> Self {
    self.rules = rules;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn outbox(&self) -> &EventOutbox<B> { &self.outbox }

  pub fn bedspaces(&self) -> BedspaceLifecycle<'_, S, B> {
    BedspaceLifecycle::new(self)
  }

  pub fn premises(&self) -> PremisesLifecycle<'_, S, B> {
    PremisesLifecycle::new(self)
  }

  pub(crate) fn today(&self) -> NaiveDate { self.clock.today() }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn find_premises(&self, id: Uuid) -> Result<Option<Premises>> {
    self.store.get_premises(id).await.map_err(Error::store)
  }

  /// A bedspace, only if it belongs to `premises_id`.
  pub async fn find_bedspace(
    &self,
    premises_id: Uuid,
    bedspace_id: Uuid,
  ) -> Result<Option<Bedspace>> {
    let bedspace = self
      .store
      .get_bedspace(bedspace_id)
      .await
      .map_err(Error::store)?;
    Ok(bedspace.filter(|b| b.premises_id == premises_id))
  }

  pub async fn list_bedspaces(&self, premises_id: Uuid) -> Result<Vec<Bedspace>> {
    self
      .store
      .list_bedspaces(premises_id)
      .await
      .map_err(Error::store)
  }

  /// A recorded event, only if it has the given type. Cancelled events are
  /// still returned; they stay in the log for audit.
  pub async fn find_event(
    &self,
    event_type: EventType,
    event_id: Uuid,
  ) -> Result<Option<LifecycleEvent>> {
    let event = self.store.get_event(event_id).await.map_err(Error::store)?;
    Ok(event.filter(|e| e.event_type() == event_type))
  }

  pub(crate) async fn latest_event(
    &self,
    entity_id: Uuid,
    event_type: EventType,
  ) -> Result<Option<LifecycleEvent>> {
    self
      .store
      .latest_event(entity_id, event_type)
      .await
      .map_err(Error::store)
  }

  /// Run the conflict scan for `boundary` over everything in `scope`.
  pub(crate) async fn scan(
    &self,
    scope: Scope,
    boundary: NaiveDate,
  ) -> Result<Option<Conflict>> {
    let lookback = boundary
      .checked_sub_days(Days::new(self.rules.turnaround_lookback_days.into()))
      .unwrap_or(NaiveDate::MIN);
    let bookings = self
      .store
      .find_active_overlapping_bookings(scope, lookback)
      .await
      .map_err(Error::store)?;
    let voids = self
      .store
      .find_overlapping_voids(scope, boundary)
      .await
      .map_err(Error::store)?;

    Ok(conflict::scan(boundary, &bookings, &voids, self.calendar.as_ref()))
  }

  // ── Writes ────────────────────────────────────────────────────────────

  pub(crate) fn new_event(
    &self,
    transaction_id: Uuid,
    user_id: Option<Uuid>,
    details: EventDetails,
  ) -> LifecycleEvent {
    LifecycleEvent {
      id: Uuid::new_v4(),
      occurred_at: self.clock.now(),
      transaction_id,
      user_id,
      details,
      cancelled_at: None,
    }
  }

  /// Record `changes` through the outbox and describe the result.
  pub(crate) async fn apply(
    &self,
    transaction_id: Uuid,
    mut changes: ChangeSet,
  ) -> Result<Outcome<Transition>> {
    let written: Vec<Uuid> = changes.premises.iter().map(|p| p.id).collect();
    changes.guards.retain(|g| !written.contains(&g.premises_id));

    match self.outbox.record(&self.store, &changes).await? {
      CommitOutcome::Committed => {}
      CommitOutcome::Stale { entity_id } => {
        debug!(%entity_id, %transaction_id, "commit rejected: stale version");
        return Ok(Err(Rejection::Conflict {
          entity_id,
          reason: "modified by a concurrent operation".into(),
        }));
      }
    }

    changes.mark_committed();
    for event in &changes.events {
      info!(
        event_id = %event.id,
        entity_id = %event.entity_id(),
        %transaction_id,
        event_type = event.event_type().discriminant(),
        "lifecycle transition applied"
      );
    }

    Ok(Ok(Transition {
      transaction_id,
      premises: changes.premises,
      bedspaces: changes.bedspaces,
      events: changes.events,
      cancelled_events: changes
        .cancellations
        .iter()
        .map(|c| c.event_id)
        .collect(),
    }))
  }

  /// Undo every live event in a transaction: restore each entity to the
  /// boundary dates recorded in its event and mark the event cancelled.
  ///
  /// A premises unarchive is kept when a bedspace outside the transaction is
  /// online, since an online bedspace needs an online premises.
  pub(crate) async fn rollback(&self, transaction_id: Uuid) -> Result<ChangeSet> {
    let events = self
      .store
      .events_in_transaction(transaction_id)
      .await
      .map_err(Error::store)?;
    let now = self.clock.now();
    let mut changes = ChangeSet::default();
    let touched: Vec<Uuid> = events
      .iter()
      .filter(|e| !e.is_cancelled())
      .filter_map(|e| e.details.bedspace_id())
      .collect();

    for event in events.iter().filter(|e| !e.is_cancelled()) {
      match &event.details {
        EventDetails::BedspaceArchived { bedspace_id, current_end_date, .. } => {
          let Some(bedspace) = self.pending_bedspace(&mut changes, *bedspace_id).await?
          else {
            warn!(%bedspace_id, event_id = %event.id, "rollback target missing");
            continue;
          };
          bedspace.end_date = *current_end_date;
        }
        EventDetails::BedspaceUnarchived {
          bedspace_id,
          current_start_date,
          current_end_date,
          ..
        } => {
          let Some(bedspace) = self.pending_bedspace(&mut changes, *bedspace_id).await?
          else {
            warn!(%bedspace_id, event_id = %event.id, "rollback target missing");
            continue;
          };
          bedspace.start_date = *current_start_date;
          bedspace.end_date = *current_end_date;
        }
        EventDetails::PremisesArchived { premises_id, current_end_date, .. } => {
          let Some(premises) = self.pending_premises(&mut changes, *premises_id).await?
          else {
            warn!(%premises_id, event_id = %event.id, "rollback target missing");
            continue;
          };
          let start_date = premises.start_date;
          premises.restore(start_date, *current_end_date);
        }
        EventDetails::PremisesUnarchived {
          premises_id,
          current_start_date,
          current_end_date,
          ..
        } => {
          let siblings = self.list_bedspaces(*premises_id).await?;
          if let Some(online) = siblings
            .iter()
            .find(|b| !touched.contains(&b.id) && !b.is_archived())
          {
            debug!(
              %premises_id,
              bedspace_id = %online.id,
              event_id = %event.id,
              "premises unarchive kept: another bedspace is online"
            );
            continue;
          }
          let Some(premises) = self.pending_premises(&mut changes, *premises_id).await?
          else {
            warn!(%premises_id, event_id = %event.id, "rollback target missing");
            continue;
          };
          premises.restore(*current_start_date, *current_end_date);
        }
      }
      changes.cancellations.push(EventCancellation {
        event_id:     event.id,
        cancelled_at: now,
      });
    }

    Ok(changes)
  }

  async fn pending_bedspace<'c>(
    &self,
    changes: &'c mut ChangeSet,
    id: Uuid,
  ) -> Result<Option<&'c mut Bedspace>> {
    if changes.bedspace_mut(id).is_none() {
      let Some(loaded) = self.store.get_bedspace(id).await.map_err(Error::store)?
      else {
        return Ok(None);
      };
      changes.bedspaces.push(loaded);
    }
    Ok(changes.bedspace_mut(id))
  }

  async fn pending_premises<'c>(
    &self,
    changes: &'c mut ChangeSet,
    id: Uuid,
  ) -> Result<Option<&'c mut Premises>> {
    if changes.premises_mut(id).is_none() {
      let Some(loaded) = self.store.get_premises(id).await.map_err(Error::store)?
      else {
        return Ok(None);
      };
      changes.premises.push(loaded);
    }
    Ok(changes.premises_mut(id))
  }
}
