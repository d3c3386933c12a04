//! Scenario tests for both lifecycles and the outbox, run against the
//! in-memory store with a frozen clock.

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, Ordering},
};

use chrono::{Duration, NaiveDate};
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::{
  Engine, Error, Outcome, Rejection, ValidationCode,
  clock::FixedClock,
  event::{Envelope, EventDetails, EventType},
  memory::{MemoryError, MemoryStore},
  model::{Bedspace, Booking, BookingStatus, Premises, PremisesStatus, VoidPeriod},
  outbox::{Emission, EventBus, EventOutbox, OutboxConfig},
  store::{AccommodationStore, ChangeSet, CommitOutcome, Scope},
  validation::{EntityKind, path},
};

// A Wednesday.
fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 12).unwrap() }

fn day(offset: i64) -> NaiveDate { today() + Duration::days(offset) }

// ─── Test doubles ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("bus unavailable")]
struct BusDown;

#[derive(Clone, Default)]
struct TestBus {
  sent: Arc<Mutex<Vec<(String, Envelope)>>>,
  down: Arc<AtomicBool>,
}

impl TestBus {
  fn sent_types(&self) -> Vec<String> {
    self
      .sent
      .lock()
      .unwrap()
      .iter()
      .map(|(_, e)| e.event_type.clone())
      .collect()
  }
}

impl EventBus for TestBus {
  type Error = BusDown;

  async fn publish(
    &self,
    topic: &str,
    envelope: &Envelope,
  ) -> std::result::Result<(), BusDown> {
    if self.down.load(Ordering::SeqCst) {
      return Err(BusDown);
    }
    self
      .sent
      .lock()
      .unwrap()
      .push((topic.to_owned(), envelope.clone()));
    Ok(())
  }
}

#[derive(Debug, thiserror::Error)]
enum ScriptedError {
  #[error("disk full")]
  DiskFull,
  #[error(transparent)]
  Memory(#[from] MemoryError),
}

/// A [`MemoryStore`] whose commits can be made to fail, whose bedspace reads
/// can be raced by a simulated concurrent writer, and whose sibling listings
/// can be held until two operations have both read.
#[derive(Clone, Default)]
struct ScriptedStore {
  inner:        MemoryStore,
  fail_commits: Arc<AtomicBool>,
  race_reads:   Arc<AtomicBool>,
  /// When set, every `list_bedspaces` call waits here after reading.
  list_gate:    Arc<Mutex<Option<Arc<Barrier>>>>,
}

type Scripted<T> = std::result::Result<T, ScriptedError>;

impl AccommodationStore for ScriptedStore {
  type Error = ScriptedError;

  async fn get_premises(&self, id: Uuid) -> Scripted<Option<Premises>> {
    Ok(self.inner.get_premises(id).await?)
  }

  async fn get_bedspace(&self, id: Uuid) -> Scripted<Option<Bedspace>> {
    let found = self.inner.get_bedspace(id).await?;
    if self.race_reads.load(Ordering::SeqCst)
      && let Some(b) = &found
    {
      let mut bumped = b.clone();
      bumped.version += 1;
      self.inner.save_bedspace(bumped).await?;
    }
    Ok(found)
  }

  async fn list_bedspaces(&self, premises_id: Uuid) -> Scripted<Vec<Bedspace>> {
    let listed = self.inner.list_bedspaces(premises_id).await?;
    let gate = self.list_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.wait().await;
    }
    Ok(listed)
  }

  async fn save_premises(&self, premises: Premises) -> Scripted<()> {
    Ok(self.inner.save_premises(premises).await?)
  }

  async fn save_bedspace(&self, bedspace: Bedspace) -> Scripted<()> {
    Ok(self.inner.save_bedspace(bedspace).await?)
  }

  async fn save_booking(&self, booking: Booking) -> Scripted<()> {
    Ok(self.inner.save_booking(booking).await?)
  }

  async fn save_void_period(&self, void: VoidPeriod) -> Scripted<()> {
    Ok(self.inner.save_void_period(void).await?)
  }

  async fn find_active_overlapping_bookings(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> Scripted<Vec<Booking>> {
    Ok(self.inner.find_active_overlapping_bookings(scope, from).await?)
  }

  async fn find_overlapping_voids(
    &self,
    scope: Scope,
    from: NaiveDate,
  ) -> Scripted<Vec<VoidPeriod>> {
    Ok(self.inner.find_overlapping_voids(scope, from).await?)
  }

  async fn get_event(
    &self,
    event_id: Uuid,
  ) -> Scripted<Option<crate::event::LifecycleEvent>> {
    Ok(self.inner.get_event(event_id).await?)
  }

  async fn latest_event(
    &self,
    entity_id: Uuid,
    event_type: EventType,
  ) -> Scripted<Option<crate::event::LifecycleEvent>> {
    Ok(self.inner.latest_event(entity_id, event_type).await?)
  }

  async fn events_in_transaction(
    &self,
    transaction_id: Uuid,
  ) -> Scripted<Vec<crate::event::LifecycleEvent>> {
    Ok(self.inner.events_in_transaction(transaction_id).await?)
  }

  async fn commit(&self, changes: &ChangeSet) -> Scripted<CommitOutcome> {
    if self.fail_commits.load(Ordering::SeqCst) {
      return Err(ScriptedError::DiskFull);
    }
    Ok(self.inner.commit(changes).await?)
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn engine_with<S: AccommodationStore>(
  store: S,
  bus: TestBus,
  emit: Emission,
) -> Engine<S, TestBus> {
  let config = OutboxConfig { emit, ..Default::default() };
  Engine::new(store, EventOutbox::new(bus, config))
    .with_clock(FixedClock::on(today()))
}

fn engine(store: &MemoryStore, bus: &TestBus) -> Engine<MemoryStore, TestBus> {
  engine_with(store.clone(), bus.clone(), Emission::default())
}

/// A premises opened a year ago with `count` bedspaces opened six months ago.
async fn premises_with<S: AccommodationStore>(
  store: &S,
  count: usize,
) -> (Premises, Vec<Bedspace>) {
  let premises = Premises::new("Elm House", day(-365));
  store.save_premises(premises.clone()).await.unwrap();

  let mut bedspaces = Vec::new();
  for i in 0..count {
    let b = Bedspace::new(premises.id, format!("room-{i}"), day(-180));
    store.save_bedspace(b.clone()).await.unwrap();
    bedspaces.push(b);
  }
  (premises, bedspaces)
}

async fn seed_bedspace(
  store: &MemoryStore,
  premises: &Premises,
  reference: &str,
  start: NaiveDate,
  end: Option<NaiveDate>,
) -> Bedspace {
  let mut b = Bedspace::new(premises.id, reference, start);
  b.end_date = end;
  store.save_bedspace(b.clone()).await.unwrap();
  b
}

async fn seed_booking(
  store: &MemoryStore,
  bedspace: &Bedspace,
  arrival: NaiveDate,
  departure: NaiveDate,
  turnaround: Option<u32>,
) -> Booking {
  let booking = Booking {
    id: Uuid::new_v4(),
    bedspace_id: bedspace.id,
    premises_id: bedspace.premises_id,
    arrival_date: arrival,
    departure_date: departure,
    status: BookingStatus::Confirmed,
    turnaround_working_days: turnaround,
  };
  store.save_booking(booking.clone()).await.unwrap();
  booking
}

async fn seed_void(store: &MemoryStore, bedspace: &Bedspace, end: NaiveDate) {
  store
    .save_void_period(VoidPeriod {
      id:           Uuid::new_v4(),
      bedspace_id:  bedspace.id,
      premises_id:  bedspace.premises_id,
      start_date:   end - Duration::days(5),
      end_date:     end,
      reason:       "Damp remediation".into(),
      cancelled_at: None,
    })
    .await
    .unwrap();
}

fn rejection<T: std::fmt::Debug>(outcome: Outcome<T>) -> Rejection {
  outcome.expect_err("operation should have been rejected")
}

fn code<T: std::fmt::Debug>(outcome: Outcome<T>) -> ValidationCode {
  rejection(outcome).code().expect("rejection should carry a code")
}

// ─── Bedspace archive ────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_bedspace_without_commitments() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;

  let transition = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(transition.bedspaces.len(), 1);
  assert_eq!(transition.bedspaces[0].end_date, Some(day(3)));
  assert!(transition.premises.is_empty());

  let stored = store.get_bedspace(beds[0].id).await.unwrap().unwrap();
  assert_eq!(stored.end_date, Some(day(3)));
  assert_eq!(stored.version, 1);
  assert_eq!(bus.sent_types(), ["accommodation.bedspace.archived"]);
}

#[tokio::test]
async fn archive_is_blocked_by_a_booking_until_the_day_after_departure() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  seed_booking(&store, &beds[0], day(4), day(11), Some(0)).await;

  let outcome = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(7), None)
    .await
    .unwrap();

  assert_eq!(
    rejection(outcome),
    Rejection::entity(
      path::END_DATE,
      ValidationCode::ExistingBookings,
      beds[0].id,
      day(12),
    )
  );
  assert!(bus.sent_types().is_empty());
  assert!(store.events().unwrap().is_empty());
}

#[tokio::test]
async fn a_past_date_is_reported_before_any_conflict() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  seed_void(&store, &beds[0], day(30)).await;

  let outcome = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(-8), None)
    .await
    .unwrap();
  assert_eq!(code(outcome), ValidationCode::InvalidEndDateInThePast);
}

#[tokio::test]
async fn archive_more_than_three_months_ahead_is_rejected() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;

  // Three months from 2024-06-12 is 2024-09-12, i.e. day 92.
  let too_far = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(93), None)
    .await
    .unwrap();
  assert_eq!(code(too_far), ValidationCode::InvalidEndDateInTheFuture);

  let at_limit = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(92), None)
    .await
    .unwrap();
  assert!(at_limit.is_ok());
}

#[tokio::test]
async fn archive_before_the_bedspace_opens_is_rejected() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  let fresh = seed_bedspace(&store, &premises, "new", day(5), None).await;

  let outcome = engine
    .bedspaces()
    .archive(premises.id, fresh.id, day(2), None)
    .await
    .unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::entity(
      path::END_DATE,
      ValidationCode::EndDateBeforeBedspaceStartDate,
      fresh.id,
      day(5),
    )
  );
}

#[tokio::test]
async fn archive_cannot_move_inside_a_previous_archive_boundary() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;

  engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(10), None)
    .await
    .unwrap()
    .unwrap();

  let outcome = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(8), None)
    .await
    .unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::entity(
      path::END_DATE,
      ValidationCode::EndDateOverlapPreviousBedspaceArchiveEndDate,
      beds[0].id,
      day(10),
    )
  );
}

#[tokio::test]
async fn archive_of_unknown_bedspace_is_not_found() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  let missing = Uuid::new_v4();

  let outcome = engine
    .bedspaces()
    .archive(premises.id, missing, day(3), None)
    .await
    .unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::not_found(EntityKind::Bedspace, missing)
  );
}

#[tokio::test]
async fn archiving_the_last_online_bedspace_archives_the_premises_at_the_latest_end() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  seed_bedspace(&store, &premises, "room-b", day(-180), Some(day(-2))).await;
  seed_bedspace(&store, &premises, "room-c", day(-180), Some(day(103))).await;
  let user = Uuid::new_v4();

  let transition = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), Some(user))
    .await
    .unwrap()
    .unwrap();

  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Archived);
  assert_eq!(stored.end_date, Some(day(103)));

  assert_eq!(transition.events.len(), 2);
  assert!(
    transition
      .events
      .iter()
      .all(|e| e.transaction_id == transition.transaction_id
        && e.user_id == Some(user))
  );
  assert_eq!(transition.events[1].event_type(), EventType::PremisesArchived);
  assert_eq!(
    bus.sent_types(),
    ["accommodation.bedspace.archived", "accommodation.premises.archived"]
  );
}

#[tokio::test]
async fn an_already_archived_premises_gets_no_second_archive_event() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (mut premises, beds) = premises_with(&store, 1).await;
  premises.archive(day(50));
  store.save_premises(premises.clone()).await.unwrap();

  let transition = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(transition.events.len(), 1);
  assert!(transition.premises.is_empty());
  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.end_date, Some(day(50)));
  assert_eq!(stored.status, PremisesStatus::Archived);
}

// ─── Bedspace unarchive ──────────────────────────────────────────────────────

#[tokio::test]
async fn archive_then_unarchive_round_trips_through_the_event_payload() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  let original = beds[0].clone();

  engine
    .bedspaces()
    .archive(premises.id, original.id, day(3), None)
    .await
    .unwrap()
    .unwrap();
  let transition = engine
    .bedspaces()
    .unarchive(premises.id, original.id, day(5), None)
    .await
    .unwrap()
    .unwrap();

  let reopened = store.get_bedspace(original.id).await.unwrap().unwrap();
  assert_eq!(reopened.start_date, day(5));
  assert_eq!(reopened.end_date, None);

  let EventDetails::BedspaceUnarchived {
    current_start_date,
    current_end_date,
    new_start_date,
    ..
  } = transition.events[0].details
  else {
    panic!("first event should be the bedspace unarchive");
  };
  assert_eq!(current_start_date, original.start_date);
  assert_eq!(current_end_date, Some(day(3)));
  assert_eq!(new_start_date, day(5));

  // The single bedspace archive had cascaded; unarchive reopens the premises.
  let premises_now = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(premises_now.status, PremisesStatus::Online);
  assert_eq!(premises_now.start_date, day(5));
  assert_eq!(transition.events[1].event_type(), EventType::PremisesUnarchived);
  assert_eq!(
    transition.events[1].transaction_id,
    transition.events[0].transaction_id
  );
  assert_eq!(bus.sent_types().len(), 4);
}

#[tokio::test]
async fn unarchive_restart_date_window() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  let archived =
    seed_bedspace(&store, &premises, "old", day(-180), Some(day(-10))).await;

  let past = engine
    .bedspaces()
    .unarchive(premises.id, archived.id, day(-8), None)
    .await
    .unwrap();
  assert_eq!(
    rejection(past),
    Rejection::field(path::RESTART_DATE, ValidationCode::InvalidRestartDateInThePast)
  );

  let future = engine
    .bedspaces()
    .unarchive(premises.id, archived.id, day(8), None)
    .await
    .unwrap();
  assert_eq!(code(future), ValidationCode::InvalidRestartDateInTheFuture);
}

#[tokio::test]
async fn unarchive_requires_an_archived_bedspace_under_the_premises() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  let (other, other_beds) = premises_with(&store, 1).await;

  let online = engine
    .bedspaces()
    .unarchive(premises.id, beds[0].id, day(1), None)
    .await
    .unwrap();
  assert_eq!(code(online), ValidationCode::BedspaceNotArchived);

  let elsewhere = engine
    .bedspaces()
    .unarchive(premises.id, other_beds[0].id, day(1), None)
    .await
    .unwrap();
  assert_eq!(
    rejection(elsewhere),
    Rejection::field(path::BEDSPACE_ID, ValidationCode::DoesNotExist)
  );
  assert_ne!(other.id, premises.id);
}

#[tokio::test]
async fn unarchive_before_the_archive_boundary_is_rejected() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  let archived =
    seed_bedspace(&store, &premises, "old", day(-180), Some(day(6))).await;

  let outcome = engine
    .bedspaces()
    .unarchive(premises.id, archived.id, day(4), None)
    .await
    .unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::entity(
      path::RESTART_DATE,
      ValidationCode::BeforeLastBedspaceArchivedDate,
      archived.id,
      day(6),
    )
  );
}

// ─── Bedspace scheduled-change rollback ──────────────────────────────────────

#[tokio::test]
async fn cancel_unarchive_on_an_online_bedspace_is_rejected() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;

  let outcome = engine
    .bedspaces()
    .cancel_scheduled_unarchive(premises.id, beds[0].id)
    .await
    .unwrap();
  assert_eq!(code(outcome), ValidationCode::BedspaceAlreadyOnline);
}

#[tokio::test]
async fn cancel_unarchive_needs_a_recorded_unarchive() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  let upcoming = seed_bedspace(&store, &premises, "new", day(3), None).await;

  let outcome = engine
    .bedspaces()
    .cancel_scheduled_unarchive(premises.id, upcoming.id)
    .await
    .unwrap();
  assert_eq!(code(outcome), ValidationCode::BedspaceNotScheduledToUnarchive);
}

#[tokio::test]
async fn cancel_unarchive_restores_bedspace_and_cascaded_premises() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  let id = beds[0].id;

  engine.bedspaces().archive(premises.id, id, day(-3), None).await.unwrap().unwrap();
  engine.bedspaces().unarchive(premises.id, id, day(4), None).await.unwrap().unwrap();

  let transition = engine
    .bedspaces()
    .cancel_scheduled_unarchive(premises.id, id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(transition.cancelled_events.len(), 2);
  assert!(transition.events.is_empty());

  let bedspace = store.get_bedspace(id).await.unwrap().unwrap();
  assert_eq!(bedspace.start_date, day(-180));
  assert_eq!(bedspace.end_date, Some(day(-3)));

  let premises_now = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(premises_now.start_date, day(-365));
  assert_eq!(premises_now.end_date, Some(day(-3)));
  assert_eq!(premises_now.status, PremisesStatus::Archived);

  // Retained for audit, but no longer the live unarchive.
  let events = store.events().unwrap();
  assert_eq!(events.len(), 4);
  assert_eq!(events.iter().filter(|e| e.is_cancelled()).count(), 2);
  assert!(
    store
      .latest_event(id, EventType::BedspaceUnarchived)
      .await
      .unwrap()
      .is_none()
  );
  // Cancellation is not a new transition; nothing further goes to the bus.
  assert_eq!(bus.sent_types().len(), 4);
}

#[tokio::test]
async fn cancel_archive_reopens_bedspace_and_premises() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  let id = beds[0].id;

  engine.bedspaces().archive(premises.id, id, day(5), None).await.unwrap().unwrap();
  engine
    .bedspaces()
    .cancel_scheduled_archive(premises.id, id)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(store.get_bedspace(id).await.unwrap().unwrap().end_date, None);
  let premises_now = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(premises_now.status, PremisesStatus::Online);

  // With the earlier archive cancelled, an earlier date is acceptable again.
  let again = engine
    .bedspaces()
    .archive(premises.id, id, day(4), None)
    .await
    .unwrap();
  assert!(again.is_ok());
}

#[tokio::test]
async fn cancel_archive_preconditions() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 1).await;
  let closed =
    seed_bedspace(&store, &premises, "closed", day(-180), Some(day(-2))).await;

  let online = engine
    .bedspaces()
    .cancel_scheduled_archive(premises.id, beds[0].id)
    .await
    .unwrap();
  assert_eq!(code(online), ValidationCode::BedspaceNotScheduledToArchive);

  let effective = engine
    .bedspaces()
    .cancel_scheduled_archive(premises.id, closed.id)
    .await
    .unwrap();
  assert_eq!(code(effective), ValidationCode::BedspaceAlreadyArchived);
}

#[tokio::test]
async fn cancel_unarchive_keeps_the_premises_online_for_another_online_bedspace() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;
  let (a, b) = (beds[0].id, beds[1].id);

  engine.premises().archive(premises.id, day(-2), None).await.unwrap().unwrap();
  // Reopens the premises in the same transaction.
  engine.bedspaces().unarchive(premises.id, a, day(5), None).await.unwrap().unwrap();
  // The premises is already online, so this one stands alone.
  engine.bedspaces().unarchive(premises.id, b, day(3), None).await.unwrap().unwrap();

  let transition = engine
    .bedspaces()
    .cancel_scheduled_unarchive(premises.id, a)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(transition.cancelled_events.len(), 1);
  assert!(transition.premises.is_empty());

  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Online);
  assert_eq!(stored.end_date, None);
  assert_eq!(stored.start_date, day(5));

  let a_now = store.get_bedspace(a).await.unwrap().unwrap();
  assert_eq!(a_now.end_date, Some(day(-2)));
  let b_now = store.get_bedspace(b).await.unwrap().unwrap();
  assert_eq!((b_now.start_date, b_now.end_date), (day(3), None));

  // The premises unarchive is still the live one.
  assert!(
    store
      .latest_event(premises.id, EventType::PremisesUnarchived)
      .await
      .unwrap()
      .is_some()
  );
}

// ─── Premises ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_premises_archives_only_online_bedspaces() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;
  let closed =
    seed_bedspace(&store, &premises, "room-z", day(-180), Some(day(-2))).await;

  let transition = engine
    .premises()
    .archive(premises.id, day(10), None)
    .await
    .unwrap()
    .unwrap();

  for b in &beds {
    let stored = store.get_bedspace(b.id).await.unwrap().unwrap();
    assert_eq!(stored.end_date, Some(day(10)));
  }
  assert_eq!(store.get_bedspace(closed.id).await.unwrap().unwrap(), closed);

  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Archived);
  assert_eq!(stored.end_date, Some(day(10)));

  let types: Vec<EventType> =
    transition.events.iter().map(|e| e.event_type()).collect();
  assert_eq!(
    types,
    [
      EventType::BedspaceArchived,
      EventType::BedspaceArchived,
      EventType::PremisesArchived
    ]
  );
  assert!(
    transition
      .events
      .iter()
      .all(|e| e.transaction_id == transition.transaction_id)
  );
  assert_eq!(bus.sent_types().len(), 3);
}

#[tokio::test]
async fn archive_premises_rejects_bedspaces_that_have_not_opened() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  let upcoming = seed_bedspace(&store, &premises, "new", day(20), None).await;

  let outcome = engine.premises().archive(premises.id, day(10), None).await.unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::entity(
      path::END_DATE,
      ValidationCode::ExistingUpcomingBedspace,
      upcoming.id,
      day(21),
    )
  );

  let past = engine.premises().archive(premises.id, day(-8), None).await.unwrap();
  assert_eq!(code(past), ValidationCode::InvalidEndDateInThePast);
}

#[tokio::test]
async fn archived_bedspaces_opening_later_do_not_block_a_premises_archive() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, _) = premises_with(&store, 1).await;
  // Scheduled to reopen on day 20, then archived again before that.
  let parked =
    seed_bedspace(&store, &premises, "parked", day(20), Some(day(40))).await;

  let transition = engine
    .premises()
    .archive(premises.id, day(10), None)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(transition.bedspaces.len(), 1);
  assert_eq!(store.get_bedspace(parked.id).await.unwrap().unwrap(), parked);
}

#[tokio::test]
async fn archive_premises_reports_the_latest_conflict_across_bedspaces() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;
  seed_booking(&store, &beds[0], day(2), day(20), None).await;
  seed_void(&store, &beds[1], day(30)).await;

  let outcome = engine.premises().archive(premises.id, day(10), None).await.unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::entity(
      path::END_DATE,
      ValidationCode::ExistingVoid,
      beds[1].id,
      day(31),
    )
  );
  assert!(bus.sent_types().is_empty());
}

#[tokio::test]
async fn unarchive_premises_reopens_only_the_premises() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (mut premises, _) = premises_with(&store, 0).await;
  let closed =
    seed_bedspace(&store, &premises, "room", day(-180), Some(day(-3))).await;
  premises.archive(day(-3));
  store.save_premises(premises.clone()).await.unwrap();

  let transition = engine
    .premises()
    .unarchive(premises.id, day(2), None)
    .await
    .unwrap()
    .unwrap();

  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Online);
  assert_eq!(stored.start_date, day(2));
  assert_eq!(stored.end_date, None);
  assert_eq!(store.get_bedspace(closed.id).await.unwrap().unwrap(), closed);
  assert_eq!(transition.events.len(), 1);
  assert_eq!(bus.sent_types(), ["accommodation.premises.unarchived"]);
}

#[tokio::test]
async fn unarchive_premises_preconditions() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (mut premises, _) = premises_with(&store, 0).await;

  let online = engine.premises().unarchive(premises.id, day(1), None).await.unwrap();
  assert_eq!(
    rejection(online),
    Rejection::field(path::PREMISES_ID, ValidationCode::PremisesNotArchived)
  );

  premises.archive(day(5));
  store.save_premises(premises.clone()).await.unwrap();

  let early = engine.premises().unarchive(premises.id, day(3), None).await.unwrap();
  assert_eq!(
    rejection(early),
    Rejection::entity(
      path::RESTART_DATE,
      ValidationCode::BeforeLastPremisesArchivedDate,
      premises.id,
      day(5),
    )
  );

  let late = engine.premises().unarchive(premises.id, day(8), None).await.unwrap();
  assert_eq!(code(late), ValidationCode::InvalidRestartDateInTheFuture);

  let missing = Uuid::new_v4();
  let unknown = engine.premises().unarchive(missing, day(6), None).await.unwrap();
  assert_eq!(
    rejection(unknown),
    Rejection::not_found(EntityKind::Premises, missing)
  );
}

#[tokio::test]
async fn cancel_premises_archive_restores_its_bedspaces() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;

  engine.premises().archive(premises.id, day(10), None).await.unwrap().unwrap();
  let transition = engine
    .premises()
    .cancel_scheduled_archive(premises.id)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(transition.cancelled_events.len(), 3);
  for b in &beds {
    assert_eq!(store.get_bedspace(b.id).await.unwrap().unwrap().end_date, None);
  }
  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Online);
  assert_eq!(stored.end_date, None);
}

#[tokio::test]
async fn cancel_premises_unarchive() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (mut premises, _) = premises_with(&store, 0).await;

  let online = engine
    .premises()
    .cancel_scheduled_unarchive(premises.id)
    .await
    .unwrap();
  assert_eq!(code(online), ValidationCode::PremisesAlreadyOnline);

  premises.archive(day(-3));
  store.save_premises(premises.clone()).await.unwrap();
  engine.premises().unarchive(premises.id, day(3), None).await.unwrap().unwrap();

  engine
    .premises()
    .cancel_scheduled_unarchive(premises.id)
    .await
    .unwrap()
    .unwrap();

  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.start_date, day(-365));
  assert_eq!(stored.end_date, Some(day(-3)));
  assert_eq!(stored.status, PremisesStatus::Archived);
}

#[tokio::test]
async fn cancel_premises_unarchive_is_refused_while_a_bedspace_is_online() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (mut premises, _) = premises_with(&store, 0).await;
  let room =
    seed_bedspace(&store, &premises, "room", day(-180), Some(day(-3))).await;
  premises.archive(day(-3));
  store.save_premises(premises.clone()).await.unwrap();

  engine.premises().unarchive(premises.id, day(3), None).await.unwrap().unwrap();
  engine.bedspaces().unarchive(premises.id, room.id, day(2), None).await.unwrap().unwrap();

  let outcome = engine
    .premises()
    .cancel_scheduled_unarchive(premises.id)
    .await
    .unwrap();
  assert_eq!(
    rejection(outcome),
    Rejection::field(path::PREMISES_ID, ValidationCode::PremisesAlreadyOnline)
  );
  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Online);
  assert_eq!(stored.start_date, day(3));
}

// ─── Outbox ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn disabled_emission_still_records_the_event() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let emit = Emission { bedspace_archived: false, ..Default::default() };
  let engine = engine_with(store.clone(), bus.clone(), emit);
  let (premises, beds) = premises_with(&store, 2).await;

  engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await
    .unwrap()
    .unwrap();

  assert!(bus.sent_types().is_empty());
  let events = store.events().unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].event_type(), EventType::BedspaceArchived);
}

#[tokio::test]
async fn publish_failure_leaves_the_commit_in_place() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  bus.down.store(true, Ordering::SeqCst);
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;

  let result = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await;

  let Err(Error::Publish { event_id, .. }) = result else {
    panic!("expected a publish error, got {result:?}");
  };
  let events = store.events().unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].id, event_id);
  assert_eq!(
    store.get_bedspace(beds[0].id).await.unwrap().unwrap().end_date,
    Some(day(3))
  );
}

#[tokio::test]
async fn persist_failure_publishes_nothing() {
  let store = ScriptedStore::default();
  let bus = TestBus::default();
  let engine = engine_with(store.clone(), bus.clone(), Emission::default());
  let (premises, beds) = premises_with(&store, 2).await;
  store.fail_commits.store(true, Ordering::SeqCst);

  let result = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await;

  assert!(matches!(result, Err(Error::Store(_))));
  assert!(bus.sent_types().is_empty());
  assert!(store.inner.events().unwrap().is_empty());
  assert_eq!(
    store.get_bedspace(beds[0].id).await.unwrap().unwrap().end_date,
    None
  );
}

#[tokio::test]
async fn a_concurrent_writer_turns_the_loser_into_a_conflict() {
  let store = ScriptedStore::default();
  let bus = TestBus::default();
  let engine = engine_with(store.clone(), bus.clone(), Emission::default());
  let (premises, beds) = premises_with(&store, 2).await;
  store.race_reads.store(true, Ordering::SeqCst);

  let outcome = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await
    .unwrap();

  assert!(matches!(
    rejection(outcome),
    Rejection::Conflict { entity_id, .. } if entity_id == beds[0].id
  ));
  assert!(bus.sent_types().is_empty());
  assert!(store.inner.events().unwrap().is_empty());
}

#[tokio::test]
async fn archiving_the_last_two_bedspaces_at_once_cannot_skip_the_cascade() {
  let store = ScriptedStore::default();
  let bus = TestBus::default();
  let engine = engine_with(store.clone(), bus.clone(), Emission::default());
  let (premises, beds) = premises_with(&store, 2).await;
  *store.list_gate.lock().unwrap() = Some(Arc::new(Barrier::new(2)));

  // Both read the sibling list before either commits, so each sees the other
  // bedspace still online.
  let (bedspaces_a, bedspaces_b) = (engine.bedspaces(), engine.bedspaces());
  let (first, second) = tokio::join!(
    bedspaces_a.archive(premises.id, beds[0].id, day(3), None),
    bedspaces_b.archive(premises.id, beds[1].id, day(5), None),
  );
  let outcomes = [first.unwrap(), second.unwrap()];

  assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
  let lost = outcomes.iter().position(|o| o.is_err()).unwrap();
  assert!(matches!(
    &outcomes[lost],
    Err(Rejection::Conflict { entity_id, .. }) if *entity_id == premises.id
  ));

  // Retrying the loser now sees the winner and archives the premises.
  *store.list_gate.lock().unwrap() = None;
  let end = [day(3), day(5)][lost];
  let retry = engine
    .bedspaces()
    .archive(premises.id, beds[lost].id, end, None)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(retry.premises.len(), 1);

  let stored = store.get_premises(premises.id).await.unwrap().unwrap();
  assert_eq!(stored.status, PremisesStatus::Archived);
  assert_eq!(stored.end_date, Some(day(5)));
}

#[tokio::test]
async fn bedspace_unarchive_conflicts_with_a_premises_change_it_did_not_see() {
  let store = MemoryStore::new();
  let (premises, _) = premises_with(&store, 1).await;
  let closed =
    seed_bedspace(&store, &premises, "closed", day(-180), Some(day(-2))).await;

  // Simulate a premises archive landing between the unarchive's read and
  // its commit by committing against the version the unarchive will carry.
  let mut changes = ChangeSet::default();
  let mut reopened = closed.clone();
  reopened.start_date = day(2);
  reopened.end_date = None;
  changes.bedspaces.push(reopened);
  changes.guard_premises(&premises);

  let mut archived = premises.clone();
  archived.archive(day(10));
  store
    .commit(&ChangeSet { premises: vec![archived], ..Default::default() })
    .await
    .unwrap();

  assert_eq!(
    store.commit(&changes).await.unwrap(),
    CommitOutcome::Stale { entity_id: premises.id }
  );
  assert_eq!(store.get_bedspace(closed.id).await.unwrap().unwrap(), closed);
}

#[tokio::test]
async fn envelope_carries_reference_block_and_detail_url() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;

  let transition = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await
    .unwrap()
    .unwrap();
  let event = &transition.events[0];

  let sent = bus.sent.lock().unwrap().clone();
  let (topic, envelope) = &sent[0];
  assert_eq!(topic, "accommodation-lifecycle");
  assert_eq!(envelope.version, 1);
  assert_eq!(envelope.description, "A bedspace has been archived");
  assert_eq!(
    envelope.detail_url,
    format!("http://localhost:8080/events/bedspace-archived/{}", event.id)
  );
  let kinds: Vec<&str> = envelope
    .reference
    .identifiers
    .iter()
    .map(|i| i.kind.as_str())
    .collect();
  assert_eq!(kinds, ["premisesId", "bedspaceId"]);
  assert_eq!(&envelope.event, event);
}

#[tokio::test]
async fn find_event_checks_the_event_type() {
  let (store, bus) = (MemoryStore::new(), TestBus::default());
  let engine = engine(&store, &bus);
  let (premises, beds) = premises_with(&store, 2).await;
  let transition = engine
    .bedspaces()
    .archive(premises.id, beds[0].id, day(3), None)
    .await
    .unwrap()
    .unwrap();
  let event_id = transition.events[0].id;

  let found = engine
    .find_event(EventType::BedspaceArchived, event_id)
    .await
    .unwrap();
  assert_eq!(found, Some(transition.events[0].clone()));
  assert_eq!(
    engine.find_event(EventType::PremisesArchived, event_id).await.unwrap(),
    None
  );
  assert_eq!(
    engine
      .find_event(EventType::BedspaceArchived, Uuid::new_v4())
      .await
      .unwrap(),
    None
  );
}
