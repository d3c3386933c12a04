//! Archive, unarchive and scheduled-change rollback for a single bedspace,
//! including the cascade onto its premises.

use chrono::{Days, Months, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  engine::{Engine, Transition},
  event::{EventDetails, EventType, LifecycleEvent},
  model::{Bedspace, Premises},
  outbox::EventBus,
  store::{AccommodationStore, ChangeSet, Scope},
  validation::{EntityKind, Outcome, Rejection, ValidationCode, check_window, path},
};

/// How far back an archive or restart date may be.
pub(crate) const PAST_WINDOW: Days = Days::new(7);
/// How far ahead an archive may be scheduled.
pub(crate) const ARCHIVE_HORIZON: Months = Months::new(3);
/// How far ahead a restart may be scheduled.
pub(crate) const RESTART_HORIZON: Days = Days::new(7);

pub(crate) fn earliest_allowed(today: NaiveDate) -> NaiveDate {
  today.checked_sub_days(PAST_WINDOW).unwrap_or(NaiveDate::MIN)
}

pub(crate) fn archive_horizon(today: NaiveDate) -> NaiveDate {
  today.checked_add_months(ARCHIVE_HORIZON).unwrap_or(NaiveDate::MAX)
}

pub(crate) fn restart_horizon(today: NaiveDate) -> NaiveDate {
  today.checked_add_days(RESTART_HORIZON).unwrap_or(NaiveDate::MAX)
}

/// Archive-date checks that need no commitment data, in reporting order.
fn validate_archive(
  bedspace: &Bedspace,
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

  if end_date < bedspace.start_date {
    return Err(Rejection::entity(
      path::END_DATE,
      ValidationCode::EndDateBeforeBedspaceStartDate,
      bedspace.id,
      bedspace.start_date,
    ));
  }

  if let Some(EventDetails::BedspaceArchived { end_date: previous_end, .. }) =
    previous.map(|e| &e.details)
  {
    if end_date <= *previous_end {
      return Err(Rejection::entity(
        path::END_DATE,
        ValidationCode::EndDateOverlapPreviousBedspaceArchiveEndDate,
        bedspace.id,
        *previous_end,
      ));
    }
  }

  Ok(())
}

fn validate_unarchive(
  bedspace: &Bedspace,
  restart_date: NaiveDate,
  today: NaiveDate,
) -> Outcome<()> {
  let Some(end_date) = bedspace.end_date else {
    return Err(Rejection::field(
      path::BEDSPACE_ID,
      ValidationCode::BedspaceNotArchived,
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
      ValidationCode::BeforeLastBedspaceArchivedDate,
      bedspace.id,
      end_date,
    ));
  }

  Ok(())
}

/// The premises end date if archiving `bedspace_id` at `end_date` leaves every
/// bedspace of the premises with an end date: the latest of them.
fn cascade_end_date(
  siblings: &[Bedspace],
  bedspace_id: Uuid,
  end_date: NaiveDate,
) -> Option<NaiveDate> {
  siblings
    .iter()
    .map(|b| if b.id == bedspace_id { Some(end_date) } else { b.end_date })
    .collect::<Option<Vec<_>>>()?
    .into_iter()
    .chain(std::iter::once(end_date))
    .max()
}

/// Bedspace-level lifecycle operations. Obtain one with
/// [`Engine::bedspaces`].
pub struct BedspaceLifecycle<'e, S, B> {
  engine: &'e Engine<S, B>,
}

impl<'e, S, B> BedspaceLifecycle<'e, S, B>
where
  S: AccommodationStore,
  B: EventBus,
{
  pub(crate) fn new(engine: &'e Engine<S, B>) -> Self { Self { engine } }

  async fn load(
    &self,
    premises_id: Uuid,
    bedspace_id: Uuid,
  ) -> Result<Outcome<(Premises, Bedspace)>> {
    let Some(premises) = self.engine.find_premises(premises_id).await? else {
      return Ok(Err(Rejection::not_found(EntityKind::Premises, premises_id)));
    };
    let Some(bedspace) = self.engine.find_bedspace(premises_id, bedspace_id).await?
    else {
      return Ok(Err(Rejection::field(
        path::BEDSPACE_ID,
        ValidationCode::DoesNotExist,
      )));
    };
    Ok(Ok((premises, bedspace)))
  }

  /// Take a bedspace out of service after `end_date`.
  ///
  /// When this leaves every bedspace of the premises archived, the premises
  /// is archived too, at the latest bedspace end date.
  pub async fn archive(
    &self,
    premises_id: Uuid,
    bedspace_id: Uuid,
    end_date: NaiveDate,
    user_id: Option<Uuid>,
  ) -> Result<Outcome<Transition>> {
    let Some(premises) = self.engine.find_premises(premises_id).await? else {
      return Ok(Err(Rejection::not_found(EntityKind::Premises, premises_id)));
    };
    let Some(bedspace) = self.engine.find_bedspace(premises_id, bedspace_id).await?
    else {
      return Ok(Err(Rejection::not_found(EntityKind::Bedspace, bedspace_id)));
    };

    let today = self.engine.today();
    let previous = self
      .engine
      .latest_event(bedspace_id, EventType::BedspaceArchived)
      .await?;
    if let Err(rejection) =
      validate_archive(&bedspace, end_date, today, previous.as_ref())
    {
      debug!(%bedspace_id, %end_date, %rejection, "bedspace archive rejected");
      return Ok(Err(rejection));
    }
    if let Some(conflict) =
      self.engine.scan(Scope::Bedspace(bedspace_id), end_date).await?
    {
      let rejection = conflict.into_rejection(path::END_DATE);
      debug!(%bedspace_id, %end_date, %rejection, "bedspace archive rejected");
      return Ok(Err(rejection));
    }

    let transaction_id = Uuid::new_v4();
    let mut changes = ChangeSet::default();

    let mut archived = bedspace.clone();
    archived.end_date = Some(end_date);
    changes.events.push(self.engine.new_event(
      transaction_id,
      user_id,
      EventDetails::BedspaceArchived {
        bedspace_id,
        premises_id,
        current_end_date: bedspace.end_date,
        end_date,
      },
    ));
    changes.bedspaces.push(archived);

    if !premises.is_archived() {
      let siblings = self.engine.list_bedspaces(premises_id).await?;
      if let Some(premises_end) = cascade_end_date(&siblings, bedspace_id, end_date)
      {
        let mut closed = premises.clone();
        closed.archive(premises_end);
        changes.events.push(self.engine.new_event(
          transaction_id,
          user_id,
          EventDetails::PremisesArchived {
            premises_id,
            current_end_date: premises.end_date,
            end_date: premises_end,
          },
        ));
        changes.premises.push(closed);
      }
    }
    // The cascade decision rests on the sibling list; pin the premises so a
    // concurrent archive of another bedspace cannot make the same decision.
    changes.guard_premises(&premises);

    self.engine.apply(transaction_id, changes).await
  }

  /// Put an archived bedspace back into service from `restart_date`,
  /// reopening its premises if that was archived too.
  pub async fn unarchive(
    &self,
    premises_id: Uuid,
    bedspace_id: Uuid,
    restart_date: NaiveDate,
    user_id: Option<Uuid>,
  ) -> Result<Outcome<Transition>> {
    let (premises, bedspace) = match self.load(premises_id, bedspace_id).await? {
      Ok(loaded) => loaded,
      Err(rejection) => return Ok(Err(rejection)),
    };

    let today = self.engine.today();
    if let Err(rejection) = validate_unarchive(&bedspace, restart_date, today) {
      debug!(%bedspace_id, %restart_date, %rejection, "bedspace unarchive rejected");
      return Ok(Err(rejection));
    }

    let transaction_id = Uuid::new_v4();
    let mut changes = ChangeSet::default();

    let mut reopened = bedspace.clone();
    reopened.start_date = restart_date;
    reopened.end_date = None;
    changes.events.push(self.engine.new_event(
      transaction_id,
      user_id,
      EventDetails::BedspaceUnarchived {
        bedspace_id,
        premises_id,
        current_start_date: bedspace.start_date,
        current_end_date: bedspace.end_date,
        new_start_date: restart_date,
      },
    ));
    changes.bedspaces.push(reopened);

    if premises.is_archived() {
      let mut online = premises.clone();
      online.reopen(restart_date);
      changes.events.push(self.engine.new_event(
        transaction_id,
        user_id,
        EventDetails::PremisesUnarchived {
          premises_id,
          current_start_date: premises.start_date,
          current_end_date: premises.end_date,
          new_start_date: restart_date,
        },
      ));
      changes.premises.push(online);
    }
    changes.guard_premises(&premises);

    self.engine.apply(transaction_id, changes).await
  }

  /// Roll back an unarchive whose restart date has not arrived yet.
  pub async fn cancel_scheduled_unarchive(
    &self,
    premises_id: Uuid,
    bedspace_id: Uuid,
  ) -> Result<Outcome<Transition>> {
    let (premises, bedspace) = match self.load(premises_id, bedspace_id).await? {
      Ok(loaded) => loaded,
      Err(rejection) => return Ok(Err(rejection)),
    };

    if bedspace.start_date <= self.engine.today() {
      return Ok(Err(Rejection::field(
        path::BEDSPACE_ID,
        ValidationCode::BedspaceAlreadyOnline,
      )));
    }
    let Some(event) = self
      .engine
      .latest_event(bedspace_id, EventType::BedspaceUnarchived)
      .await?
    else {
      return Ok(Err(Rejection::field(
        path::BEDSPACE_ID,
        ValidationCode::BedspaceNotScheduledToUnarchive,
      )));
    };

    let mut changes = self.engine.rollback(event.transaction_id).await?;
    changes.guard_premises(&premises);
    self.engine.apply(event.transaction_id, changes).await
  }

  /// Roll back an archive whose end date has not passed yet.
  pub async fn cancel_scheduled_archive(
    &self,
    premises_id: Uuid,
    bedspace_id: Uuid,
  ) -> Result<Outcome<Transition>> {
    let (premises, bedspace) = match self.load(premises_id, bedspace_id).await? {
      Ok(loaded) => loaded,
      Err(rejection) => return Ok(Err(rejection)),
    };

    let Some(end_date) = bedspace.end_date else {
      return Ok(Err(Rejection::field(
        path::BEDSPACE_ID,
        ValidationCode::BedspaceNotScheduledToArchive,
      )));
    };
    if end_date < self.engine.today() {
      return Ok(Err(Rejection::entity(
        path::BEDSPACE_ID,
        ValidationCode::BedspaceAlreadyArchived,
        bedspace_id,
        end_date,
      )));
    }
    let Some(event) = self
      .engine
      .latest_event(bedspace_id, EventType::BedspaceArchived)
      .await?
    else {
      return Ok(Err(Rejection::field(
        path::BEDSPACE_ID,
        ValidationCode::BedspaceNotScheduledToArchive,
      )));
    };

    let mut changes = self.engine.rollback(event.transaction_id).await?;
    changes.guard_premises(&premises);
    self.engine.apply(event.transaction_id, changes).await
  }
}
