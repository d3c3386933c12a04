//! Lifecycle events: the durable record of every archive/unarchive.
//!
//! Events are append-only. The single permitted mutation is setting
//! `cancelled_at` when a scheduled transition is rolled back before it takes
//! effect; the row itself is kept for audit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

// ─── Event type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
  BedspaceArchived,
  BedspaceUnarchived,
  PremisesArchived,
  PremisesUnarchived,
}

impl EventType {
  pub const ALL: [Self; 4] = [
    Self::BedspaceArchived,
    Self::BedspaceUnarchived,
    Self::PremisesArchived,
    Self::PremisesUnarchived,
  ];

  /// The discriminant stored in the `event_type` column.
  /// Must match the `rename_all = "kebab-case"` serde tags.
  pub fn discriminant(self) -> &'static str {
    match self {
      Self::BedspaceArchived => "bedspace-archived",
      Self::BedspaceUnarchived => "bedspace-unarchived",
      Self::PremisesArchived => "premises-archived",
      Self::PremisesUnarchived => "premises-unarchived",
    }
  }

  pub fn from_discriminant(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|t| t.discriminant() == s)
  }

  /// The event-type string carried on the bus envelope.
  pub fn bus_name(self) -> &'static str {
    match self {
      Self::BedspaceArchived => "accommodation.bedspace.archived",
      Self::BedspaceUnarchived => "accommodation.bedspace.unarchived",
      Self::PremisesArchived => "accommodation.premises.archived",
      Self::PremisesUnarchived => "accommodation.premises.unarchived",
    }
  }

  pub fn description(self) -> &'static str {
    match self {
      Self::BedspaceArchived => "A bedspace has been archived",
      Self::BedspaceUnarchived => "A bedspace has been unarchived",
      Self::PremisesArchived => "A premises has been archived",
      Self::PremisesUnarchived => "A premises has been unarchived",
    }
  }
}

// ─── Details ─────────────────────────────────────────────────────────────────

/// Type-specific body of a lifecycle event.
///
/// Every variant records the boundary dates the entity had *before* the
/// transition (`current_*`) so the transition can be rolled back exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum EventDetails {
  #[serde(rename_all = "camelCase")]
  BedspaceArchived {
    bedspace_id:      Uuid,
    premises_id:      Uuid,
    current_end_date: Option<NaiveDate>,
    end_date:         NaiveDate,
  },
  #[serde(rename_all = "camelCase")]
  BedspaceUnarchived {
    bedspace_id:        Uuid,
    premises_id:        Uuid,
    current_start_date: NaiveDate,
    current_end_date:   Option<NaiveDate>,
    new_start_date:     NaiveDate,
  },
  #[serde(rename_all = "camelCase")]
  PremisesArchived {
    premises_id:      Uuid,
    current_end_date: Option<NaiveDate>,
    end_date:         NaiveDate,
  },
  #[serde(rename_all = "camelCase")]
  PremisesUnarchived {
    premises_id:        Uuid,
    current_start_date: NaiveDate,
    current_end_date:   Option<NaiveDate>,
    new_start_date:     NaiveDate,
  },
}

impl EventDetails {
  pub fn event_type(&self) -> EventType {
    match self {
      Self::BedspaceArchived { .. } => EventType::BedspaceArchived,
      Self::BedspaceUnarchived { .. } => EventType::BedspaceUnarchived,
      Self::PremisesArchived { .. } => EventType::PremisesArchived,
      Self::PremisesUnarchived { .. } => EventType::PremisesUnarchived,
    }
  }

  pub fn premises_id(&self) -> Uuid {
    match self {
      Self::BedspaceArchived { premises_id, .. }
      | Self::BedspaceUnarchived { premises_id, .. }
      | Self::PremisesArchived { premises_id, .. }
      | Self::PremisesUnarchived { premises_id, .. } => *premises_id,
    }
  }

  pub fn bedspace_id(&self) -> Option<Uuid> {
    match self {
      Self::BedspaceArchived { bedspace_id, .. }
      | Self::BedspaceUnarchived { bedspace_id, .. } => Some(*bedspace_id),
      Self::PremisesArchived { .. } | Self::PremisesUnarchived { .. } => None,
    }
  }

  /// The entity whose lifecycle this event records.
  pub fn entity_id(&self) -> Uuid {
    self.bedspace_id().unwrap_or_else(|| self.premises_id())
  }

  /// Serialise the inner payload (without the type tag) for storage.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from a stored discriminant and payload.
  pub fn from_parts(
    discriminant: &str,
    data: serde_json::Value,
  ) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": discriminant, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Event record ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
  pub id:             Uuid,
  pub occurred_at:    DateTime<Utc>,
  /// Shared by every event emitted from one logical operation.
  pub transaction_id: Uuid,
  pub user_id:        Option<Uuid>,
  pub details:        EventDetails,
  pub cancelled_at:   Option<DateTime<Utc>>,
}

impl LifecycleEvent {
  pub fn event_type(&self) -> EventType { self.details.event_type() }

  pub fn entity_id(&self) -> Uuid { self.details.entity_id() }

  pub fn is_cancelled(&self) -> bool { self.cancelled_at.is_some() }
}

// ─── Bus envelope ────────────────────────────────────────────────────────────

/// One identifier in the envelope's reference block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
  #[serde(rename = "type")]
  pub kind:  String,
  pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
  pub identifiers: Vec<Identifier>,
}

/// The wire form of a lifecycle event; one bus message per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
  pub event_type:  String,
  pub version:     u32,
  pub description: String,
  pub detail_url:  String,
  pub occurred_at: DateTime<Utc>,
  pub reference:   Reference,
  pub event:       LifecycleEvent,
}
