//! Handlers for `/events` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/events/{event_type}/{event_id}` | Target of an envelope's `detailUrl`; 404 if the id is unknown or has another type |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use haven_core::{
  Engine, Rejection,
  event::{EventType, LifecycleEvent},
  outbox::EventBus,
  store::AccommodationStore,
  validation::EntityKind,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /events/{event_type}/{event_id}`
pub async fn get_one<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path((event_type, event_id)): Path<(String, Uuid)>,
) -> Result<Json<LifecycleEvent>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let not_found = || Rejection::not_found(EntityKind::Event, event_id);
  let event_type = EventType::from_discriminant(&event_type).ok_or_else(not_found)?;
  let event = engine
    .find_event(event_type, event_id)
    .await?
    .ok_or_else(not_found)?;
  Ok(Json(event))
}
