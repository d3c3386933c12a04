//! Premises-wide archive and unarchive.
//!
//! Archiving a premises archives each of its online bedspaces at the same
//! date. Unarchiving a premises reopens only the premises; bedspaces come back
//! one at a time through [`crate::bedspace`].

use chrono::{Days, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  bedspace::{archive_horizon, earliest_allowed, restart_horizon},
  engine::{Engine, Transition},
  event::{EventDetails, EventType, LifecycleEvent},
  model::{Bedspace, Premises},
  outbox::EventBus,
  store::{AccommodationStore, ChangeSet, Scope},
  validation::{EntityKind, Outcome, Rejection, ValidationCode, check_window, path},
};

fn validate_archive(
  premises: &Premises,
  bedspaces: &[Bedspace],
  end_date: NaiveDate,
  today: NaiveDate,
  previous: Option<&LifecycleEvent>,
) -> Outcome<()> {
  check_window(
    end_date,
    earliest_allowed(today),
    archive_horizon(today),
    path::END_DATE,
    ValidationCode::InvalidEndDateInThePast,
    ValidationCode::InvalidEndDateInTheFuture,
  )?;

  if end_date < premises.start_date {
    return Err(Rejection::entity(
      path::END_DATE,
      ValidationCode::EndDateBeforePremisesStartDate,
      premises.id,
      premises.start_date,
    ));
  }

  if let Some(EventDetails::PremisesArchived { end_date: previous_end, .. }) =
    previous.map(|e| &e.details)
  {
    if end_date <= *previous_end {
      return Err(Rejection::entity(
        path::END_DATE,
        ValidationCode::EndDateOverlapPreviousPremisesArchiveEndDate,
        premises.id,
        *previous_end,
      ));
    }
  }

  // A bedspace that opens after the end date would be archived before it
  // ever came online. Archived bedspaces are left out: they carry their own
  // end date and the archive does not touch them.
  if let Some(upcoming) = bedspaces
    .iter()
    .filter(|b| !b.is_archived() && b.start_date > end_date)
    .max_by_key(|b| b.start_date)
  {
    return Err(Rejection::entity(
      path::END_DATE,
      ValidationCode::ExistingUpcomingBedspace,
      upcoming.id,
      upcoming
        .start_date
        .checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MAX),
    ));
  }

  Ok(())
}

fn validate_unarchive(
  premises: &Premises,
  restart_date: NaiveDate,
  today: NaiveDate,
) -> Outcome<()> {
  let Some(end_date) = premises.end_date else {
    return Err(Rejection::field(
      path::PREMISES_ID,
      ValidationCode::PremisesNotArchived,
    ));
  };

  check_window(
    restart_date,
    earliest_allowed(today),
    restart_horizon(today),
    path::RESTART_DATE,
    ValidationCode::InvalidRestartDateInThePast,
    ValidationCode::InvalidRestartDateInTheFuture,
  )?;

  if restart_date < end_date {
    return Err(Rejection::entity(
      path::RESTART_DATE,
      ValidationCode::BeforeLastPremisesArchivedDate,
      premises.id,
      end_date,
    ));
  }

  Ok(())
}

/// Premises-level lifecycle operations. Obtain one with [`Engine::premises`].
pub struct PremisesLifecycle<'e, S, B> {
  engine: &'e Engine<S, B>,
}

impl<'e, S, B> PremisesLifecycle<'e, S, B>
where
  S: AccommodationStore,
  B: EventBus,
{
  pub(crate) fn new(engine: &'e Engine<S, B>) -> Self { Self { engine } }

  async fn load(&self, premises_id: Uuid) -> Result<Outcome<Premises>> {
    Ok(
      self
        .engine
        .find_premises(premises_id)
        .await?
        .ok_or(Rejection::not_found(EntityKind::Premises, premises_id)),
    )
  }

  /// Take the premises and every online bedspace out of service after
  /// `end_date`. Bedspaces already archived keep their own end dates.
  pub async fn archive(
    &self,
    premises_id: Uuid,
    end_date: NaiveDate,
    user_id: Option<Uuid>,
  ) -> Result<Outcome<Transition>> {
    let premises = match self.load(premises_id).await? {
      Ok(p) => p,
      Err(rejection) => return Ok(Err(rejection)),
    };
    let bedspaces = self.engine.list_bedspaces(premises_id).await?;
    let previous = self
      .engine
      .latest_event(premises_id, EventType::PremisesArchived)
      .await?;

    let today = self.engine.today();
    if let Err(rejection) =
      validate_archive(&premises, &bedspaces, end_date, today, previous.as_ref())
    {
      debug!(%premises_id, %end_date, %rejection, "premises archive rejected");
      return Ok(Err(rejection));
    }
    if let Some(conflict) =
      self.engine.scan(Scope::Premises(premises_id), end_date).await?
    {
      let rejection = conflict.into_rejection(path::END_DATE);
      debug!(%premises_id, %end_date, %rejection, "premises archive rejected");
      return Ok(Err(rejection));
    }

    let transaction_id = Uuid::new_v4();
    let mut changes = ChangeSet::default();

    for bedspace in bedspaces.into_iter().filter(|b| !b.is_archived()) {
      changes.events.push(self.engine.new_event(
        transaction_id,
        user_id,
        EventDetails::BedspaceArchived {
          bedspace_id: bedspace.id,
          premises_id,
          current_end_date: None,
          end_date,
        },
      ));
      let mut archived = bedspace;
      archived.end_date = Some(end_date);
      changes.bedspaces.push(archived);
    }

    let mut closed = premises.clone();
    closed.archive(end_date);
    changes.events.push(self.engine.new_event(
      transaction_id,
      user_id,
      EventDetails::PremisesArchived {
        premises_id,
        current_end_date: premises.end_date,
        end_date,
      },
    ));
    changes.premises.push(closed);

    self.engine.apply(transaction_id, changes).await
  }

  /// Reopen an archived premises from `restart_date`.
  pub async fn unarchive(
    &self,
    premises_id: Uuid,
    restart_date: NaiveDate,
    user_id: Option<Uuid>,
  ) -> Result<Outcome<Transition>> {
    let premises = match self.load(premises_id).await? {
      Ok(p) => p,
      Err(rejection) => return Ok(Err(rejection)),
    };

    if let Err(rejection) =
      validate_unarchive(&premises, restart_date, self.engine.today())
    {
      debug!(%premises_id, %restart_date, %rejection, "premises unarchive rejected");
      return Ok(Err(rejection));
    }

    let transaction_id = Uuid::new_v4();
    let mut online = premises.clone();
    online.reopen(restart_date);

    let changes = ChangeSet {
      premises: vec![online],
      events: vec![self.engine.new_event(
        transaction_id,
        user_id,
        EventDetails::PremisesUnarchived {
          premises_id,
          current_start_date: premises.start_date,
          current_end_date: premises.end_date,
          new_start_date: restart_date,
        },
      )],
      ..Default::default()
    };

    self.engine.apply(transaction_id, changes).await
  }

  /// Roll back a premises archive (and the bedspace archives it carried)
  /// whose end date has not passed yet.
  pub async fn cancel_scheduled_archive(
    &self,
    premises_id: Uuid,
  ) -> Result<Outcome<Transition>> {
    let premises = match self.load(premises_id).await? {
      Ok(p) => p,
      Err(rejection) => return Ok(Err(rejection)),
    };

    let Some(end_date) = premises.end_date else {
      return Ok(Err(Rejection::field(
        path::PREMISES_ID,
        ValidationCode::PremisesNotScheduledToArchive,
      )));
    };
    if end_date < self.engine.today() {
      return Ok(Err(Rejection::entity(
        path::PREMISES_ID,
        ValidationCode::PremisesAlreadyArchived,
        premises_id,
        end_date,
      )));
    }
    let Some(event) = self
      .engine
      .latest_event(premises_id, EventType::PremisesArchived)
      .await?
    else {
      return Ok(Err(Rejection::field(
        path::PREMISES_ID,
        ValidationCode::PremisesNotScheduledToArchive,
      )));
    };

    let changes = self.engine.rollback(event.transaction_id).await?;
    self.engine.apply(event.transaction_id, changes).await
  }

  /// Roll back a premises unarchive whose restart date has not arrived yet.
  pub async fn cancel_scheduled_unarchive(
    &self,
    premises_id: Uuid,
  ) -> Result<Outcome<Transition>> {
    let premises = match self.load(premises_id).await? {
      Ok(p) => p,
      Err(rejection) => return Ok(Err(rejection)),
    };

    if premises.start_date <= self.engine.today() {
      return Ok(Err(Rejection::field(
        path::PREMISES_ID,
        ValidationCode::PremisesAlreadyOnline,
      )));
    }
    let Some(event) = self
      .engine
      .latest_event(premises_id, EventType::PremisesUnarchived)
      .await?
    else {
      return Ok(Err(Rejection::field(
        path::PREMISES_ID,
        ValidationCode::PremisesNotScheduledToUnarchive,
      )));
    };

    let mut changes = self.engine.rollback(event.transaction_id).await?;
    if changes.cancellations.is_empty() {
      // Kept by rollback: a bedspace of the premises is online.
      return Ok(Err(Rejection::field(
        path::PREMISES_ID,
        ValidationCode::PremisesAlreadyOnline,
      )));
    }
    changes.guard_premises(&premises);
    self.engine.apply(event.transaction_id, changes).await
  }
}
