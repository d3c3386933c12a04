//! Handlers for `/premises/{id}` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/premises/{id}` | 404 if not found |
//! | `POST` | `/premises/{id}/archive` | Body: `{"endDate":"YYYY-MM-DD"}` |
//! | `POST` | `/premises/{id}/unarchive` | Body: `{"restartDate":"YYYY-MM-DD"}` |
//! | `PUT`  | `/premises/{id}/cancel-archive` | Roll back a scheduled archive |
//! | `PUT`  | `/premises/{id}/cancel-unarchive` | Roll back a scheduled unarchive |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::HeaderMap,
};
use chrono::NaiveDate;
use haven_core::{
  Engine, Rejection, Transition, model::Premises, outbox::EventBus,
  store::AccommodationStore, validation::EntityKind,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  acting_user,
  error::{ApiError, respond},
};

// ─── Bodies ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveBody {
  pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnarchiveBody {
  pub restart_date: NaiveDate,
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /premises/{id}`
pub async fn get_one<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Premises>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let premises = engine
    .find_premises(id)
    .await?
    .ok_or_else(|| Rejection::not_found(EntityKind::Premises, id))?;
  Ok(Json(premises))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// `POST /premises/{id}/archive`
pub async fn archive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<ArchiveBody>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let user_id = acting_user(&headers)?;
  respond(engine.premises().archive(id, body.end_date, user_id).await)
}

/// `POST /premises/{id}/unarchive`
pub async fn unarchive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<UnarchiveBody>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let user_id = acting_user(&headers)?;
  respond(engine.premises().unarchive(id, body.restart_date, user_id).await)
}

/// `PUT /premises/{id}/cancel-archive`
pub async fn cancel_archive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  respond(engine.premises().cancel_scheduled_archive(id).await)
}

/// `PUT /premises/{id}/cancel-unarchive`
pub async fn cancel_unarchive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  respond(engine.premises().cancel_scheduled_unarchive(id).await)
}
