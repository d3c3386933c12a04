//! The transactional event outbox.
//!
//! `persist` writes lifecycle events in the same store commit as the entity
//! changes that produced them. `publish` then hands each event to the bus.
//! Publication is attempted only after a successful commit, and a failed
//! publish leaves the commit in place: the event log is the source from which
//! delivery can be retried.

use std::future::Future;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  event::{Envelope, EventType, Identifier, LifecycleEvent, Reference},
  store::{AccommodationStore, ChangeSet, CommitOutcome},
};

/// Schema version stamped on every envelope.
pub const ENVELOPE_VERSION: u32 = 1;

// ─── Bus ─────────────────────────────────────────────────────────────────────

/// An external message bus. A publish is a single fallible call; timeouts
/// and cancellation are the implementation's concern.
pub trait EventBus: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn publish<'a>(
    &'a self,
    topic: &'a str,
    envelope: &'a Envelope,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn enabled() -> bool { true }

/// Per-event-type switch for bus delivery. Persisting is never switched off.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Emission {
  #[serde(default = "enabled")]
  pub bedspace_archived:   bool,
  #[serde(default = "enabled")]
  pub bedspace_unarchived: bool,
  #[serde(default = "enabled")]
  pub premises_archived:   bool,
  #[serde(default = "enabled")]
  pub premises_unarchived: bool,
}

impl Default for Emission {
  fn default() -> Self {
    Self {
      bedspace_archived:   true,
      bedspace_unarchived: true,
      premises_archived:   true,
      premises_unarchived: true,
    }
  }
}

impl Emission {
  pub fn is_enabled(&self, event_type: EventType) -> bool {
    match event_type {
      EventType::BedspaceArchived => self.bedspace_archived,
      EventType::BedspaceUnarchived => self.bedspace_unarchived,
      EventType::PremisesArchived => self.premises_archived,
      EventType::PremisesUnarchived => self.premises_unarchived,
    }
  }
}

fn default_topic() -> String { "accommodation-lifecycle".into() }

fn default_detail_base_url() -> String { "http://localhost:8080/events".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
  #[serde(default = "default_topic")]
  pub topic:           String,
  /// Prefix of each envelope's `detailUrl`.
  #[serde(default = "default_detail_base_url")]
  pub detail_base_url: String,
  #[serde(default)]
  pub emit:            Emission,
}

impl Default for OutboxConfig {
  fn default() -> Self {
    Self {
      topic:           default_topic(),
      detail_base_url: default_detail_base_url(),
      emit:            Emission::default(),
    }
  }
}

// ─── Outbox ──────────────────────────────────────────────────────────────────

pub struct EventOutbox<B> {
  bus:    B,
  config: OutboxConfig,
}

impl<B: EventBus> EventOutbox<B> {
  pub fn new(bus: B, config: OutboxConfig) -> Self { Self { bus, config } }

  pub fn bus(&self) -> &B { &self.bus }

  pub fn config(&self) -> &OutboxConfig { &self.config }

  /// Wrap an event in its bus envelope.
  pub fn envelope(&self, event: &LifecycleEvent) -> Envelope {
    let event_type = event.event_type();

    let mut identifiers = vec![Identifier {
      kind:  "premisesId".into(),
      value: event.details.premises_id().to_string(),
    }];
    if let Some(bedspace_id) = event.details.bedspace_id() {
      identifiers.push(Identifier {
        kind:  "bedspaceId".into(),
        value: bedspace_id.to_string(),
      });
    }

    Envelope {
      event_type:  event_type.bus_name().into(),
      version:     ENVELOPE_VERSION,
      description: event_type.description().into(),
      detail_url:  format!(
        "{}/{}/{}",
        self.config.detail_base_url.trim_end_matches('/'),
        event_type.discriminant(),
        event.id
      ),
      occurred_at: event.occurred_at,
      reference:   Reference { identifiers },
      event:       event.clone(),
    }
  }

  /// Commit `changes`: entity updates and event rows together.
  pub async fn persist<S: AccommodationStore>(
    &self,
    store: &S,
    changes: &ChangeSet,
  ) -> Result<CommitOutcome> {
    store.commit(changes).await.map_err(Error::store)
  }

  /// Send one event to the bus unless emission is disabled for its type.
  /// Returns whether a message was sent.
  pub async fn publish(&self, event: &LifecycleEvent) -> Result<bool> {
    let event_type = event.event_type();
    if !self.config.emit.is_enabled(event_type) {
      debug!(
        event_id = %event.id,
        event_type = event_type.discriminant(),
        "emission disabled; event recorded but not published"
      );
      return Ok(false);
    }

    let envelope = self.envelope(event);
    self
      .bus
      .publish(&self.config.topic, &envelope)
      .await
      .map_err(|e| {
        warn!(
          event_id = %event.id,
          event_type = event_type.discriminant(),
          error = %e,
          "publish failed after commit; event remains in the log"
        );
        Error::Publish { event_id: event.id, source: Box::new(e) }
      })?;
    Ok(true)
  }

  /// Persist, then publish every new event in order.
  ///
  /// A persist failure propagates before any publish is attempted. A stale
  /// commit publishes nothing. The first publish failure propagates and the
  /// remaining events stay unpublished in the log.
  pub async fn record<S: AccommodationStore>(
    &self,
    store: &S,
    changes: &ChangeSet,
  ) -> Result<CommitOutcome> {
    let outcome = self.persist(store, changes).await?;
    if outcome != CommitOutcome::Committed {
      return Ok(outcome);
    }
    for event in &changes.events {
      self.publish(event).await?;
    }
    Ok(outcome)
  }
}
