//! Typed validation outcomes.
//!
//! Every expected failure of a lifecycle operation is a [`Rejection`],
//! returned as the `Err` arm of an [`Outcome`]. Rejections are produced before
//! any mutation is attempted.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Field paths reported alongside validation codes.
pub mod path {
  pub const END_DATE: &str = "$.endDate";
  pub const RESTART_DATE: &str = "$.restartDate";
  pub const BEDSPACE_ID: &str = "$.bedspaceId";
  pub const PREMISES_ID: &str = "$.premisesId";
}

/// Machine-readable validation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationCode {
  InvalidEndDateInThePast,
  InvalidEndDateInTheFuture,
  EndDateBeforeBedspaceStartDate,
  EndDateBeforePremisesStartDate,
  EndDateOverlapPreviousBedspaceArchiveEndDate,
  EndDateOverlapPreviousPremisesArchiveEndDate,
  ExistingBookings,
  ExistingTurnaround,
  ExistingVoid,
  ExistingUpcomingBedspace,
  DoesNotExist,
  BedspaceNotArchived,
  PremisesNotArchived,
  InvalidRestartDateInThePast,
  InvalidRestartDateInTheFuture,
  BeforeLastBedspaceArchivedDate,
  BeforeLastPremisesArchivedDate,
  BedspaceAlreadyOnline,
  PremisesAlreadyOnline,
  BedspaceNotScheduledToUnarchive,
  PremisesNotScheduledToUnarchive,
  BedspaceNotScheduledToArchive,
  PremisesNotScheduledToArchive,
  BedspaceAlreadyArchived,
  PremisesAlreadyArchived,
}

impl ValidationCode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::InvalidEndDateInThePast => "invalidEndDateInThePast",
      Self::InvalidEndDateInTheFuture => "invalidEndDateInTheFuture",
      Self::EndDateBeforeBedspaceStartDate => "endDateBeforeBedspaceStartDate",
      Self::EndDateBeforePremisesStartDate => "endDateBeforePremisesStartDate",
      Self::EndDateOverlapPreviousBedspaceArchiveEndDate => {
        "endDateOverlapPreviousBedspaceArchiveEndDate"
      }
      Self::EndDateOverlapPreviousPremisesArchiveEndDate => {
        "endDateOverlapPreviousPremisesArchiveEndDate"
      }
      Self::ExistingBookings => "existingBookings",
      Self::ExistingTurnaround => "existingTurnaround",
      Self::ExistingVoid => "existingVoid",
      Self::ExistingUpcomingBedspace => "existingUpcomingBedspace",
      Self::DoesNotExist => "doesNotExist",
      Self::BedspaceNotArchived => "bedspaceNotArchived",
      Self::PremisesNotArchived => "premisesNotArchived",
      Self::InvalidRestartDateInThePast => "invalidRestartDateInThePast",
      Self::InvalidRestartDateInTheFuture => "invalidRestartDateInTheFuture",
      Self::BeforeLastBedspaceArchivedDate => "beforeLastBedspaceArchivedDate",
      Self::BeforeLastPremisesArchivedDate => "beforeLastPremisesArchivedDate",
      Self::BedspaceAlreadyOnline => "bedspaceAlreadyOnline",
      Self::PremisesAlreadyOnline => "premisesAlreadyOnline",
      Self::BedspaceNotScheduledToUnarchive => "bedspaceNotScheduledToUnarchive",
      Self::PremisesNotScheduledToUnarchive => "premisesNotScheduledToUnarchive",
      Self::BedspaceNotScheduledToArchive => "bedspaceNotScheduledToArchive",
      Self::PremisesNotScheduledToArchive => "premisesNotScheduledToArchive",
      Self::BedspaceAlreadyArchived => "bedspaceAlreadyArchived",
      Self::PremisesAlreadyArchived => "premisesAlreadyArchived",
    }
  }
}

impl fmt::Display for ValidationCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Premises,
  Bedspace,
  Event,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Premises => f.write_str("premises"),
      Self::Bedspace => f.write_str("bedspace"),
      Self::Event => f.write_str("event"),
    }
  }
}

// ─── Rejection ───────────────────────────────────────────────────────────────

/// An expected, typed failure of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
  /// A single field is invalid on its own.
  Field {
    path: &'static str,
    code: ValidationCode,
  },
  /// Invalid in the context of a specific entity; `value` is the date that
  /// explains the failure (e.g. the first date the entity is actually free).
  Entity {
    path:      &'static str,
    code:      ValidationCode,
    entity_id: Uuid,
    value:     NaiveDate,
  },
  NotFound {
    entity: EntityKind,
    id:     Uuid,
  },
  /// The entity changed underneath the operation.
  Conflict {
    entity_id: Uuid,
    reason:    String,
  },
}

impl Rejection {
  pub fn field(path: &'static str, code: ValidationCode) -> Self {
    Self::Field { path, code }
  }

  pub fn entity(
    path: &'static str,
    code: ValidationCode,
    entity_id: Uuid,
    value: NaiveDate,
  ) -> Self {
    Self::Entity { path, code, entity_id, value }
  }

  pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
    Self::NotFound { entity, id }
  }

  pub fn code(&self) -> Option<ValidationCode> {
    match self {
      Self::Field { code, .. } | Self::Entity { code, .. } => Some(*code),
      Self::NotFound { .. } | Self::Conflict { .. } => None,
    }
  }
}

impl fmt::Display for Rejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Field { path, code } => write!(f, "{path}: {code}"),
      Self::Entity { path, code, entity_id, value } => {
        write!(f, "{path}: {code} (entity {entity_id}, {value})")
      }
      Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
      Self::Conflict { entity_id, reason } => {
        write!(f, "conflict on {entity_id}: {reason}")
      }
    }
  }
}

/// Result of a lifecycle operation that passed the fatal-error boundary.
pub type Outcome<T> = std::result::Result<T, Rejection>;

/// Check `date` against an inclusive window, reporting which side it fell off.
pub(crate) fn check_window(
  date: NaiveDate,
  earliest: NaiveDate,
  latest: NaiveDate,
  path: &'static str,
  too_early: ValidationCode,
  too_late: ValidationCode,
) -> Outcome<()> {
  if date < earliest {
    return Err(Rejection::field(path, too_early));
  }
  if date > latest {
    return Err(Rejection::field(path, too_late));
  }
  Ok(())
}
