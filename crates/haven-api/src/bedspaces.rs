//! Handlers for `/premises/{id}/bedspaces` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/premises/{id}/bedspaces` | Ordered by reference |
//! | `GET`  | `/premises/{id}/bedspaces/{bedspace_id}` | 404 if not under the premises |
//! | `POST` | `…/{bedspace_id}/archive` | Body: `{"endDate":"YYYY-MM-DD"}` |
//! | `POST` | `…/{bedspace_id}/unarchive` | Body: `{"restartDate":"YYYY-MM-DD"}` |
//! | `PUT`  | `…/{bedspace_id}/cancel-archive` | |
//! | `PUT`  | `…/{bedspace_id}/cancel-unarchive` | |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::HeaderMap,
};
use haven_core::{
  Engine, Rejection, Transition, model::Bedspace, outbox::EventBus,
  store::AccommodationStore, validation::EntityKind,
};
use uuid::Uuid;

use crate::{
  acting_user,
  error::{ApiError, respond},
  premises::{ArchiveBody, UnarchiveBody},
};

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /premises/{id}/bedspaces`
pub async fn list<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Bedspace>>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  if engine.find_premises(id).await?.is_none() {
    return Err(Rejection::not_found(EntityKind::Premises, id).into());
  }
  Ok(Json(engine.list_bedspaces(id).await?))
}

/// `GET /premises/{id}/bedspaces/{bedspace_id}`
pub async fn get_one<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path((id, bedspace_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Bedspace>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let bedspace = engine
    .find_bedspace(id, bedspace_id)
    .await?
    .ok_or_else(|| Rejection::not_found(EntityKind::Bedspace, bedspace_id))?;
  Ok(Json(bedspace))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// `POST /premises/{id}/bedspaces/{bedspace_id}/archive`
pub async fn archive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path((id, bedspace_id)): Path<(Uuid, Uuid)>,
  headers: HeaderMap,
  Json(body): Json<ArchiveBody>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let user_id = acting_user(&headers)?;
  respond(
    engine
      .bedspaces()
      .archive(id, bedspace_id, body.end_date, user_id)
      .await,
  )
}

/// `POST /premises/{id}/bedspaces/{bedspace_id}/unarchive`
pub async fn unarchive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path((id, bedspace_id)): Path<(Uuid, Uuid)>,
  headers: HeaderMap,
  Json(body): Json<UnarchiveBody>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  let user_id = acting_user(&headers)?;
  respond(
    engine
      .bedspaces()
      .unarchive(id, bedspace_id, body.restart_date, user_id)
      .await,
  )
}

/// `PUT /premises/{id}/bedspaces/{bedspace_id}/cancel-archive`
pub async fn cancel_archive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path((id, bedspace_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  respond(engine.bedspaces().cancel_scheduled_archive(id, bedspace_id).await)
}

/// `PUT /premises/{id}/bedspaces/{bedspace_id}/cancel-unarchive`
pub async fn cancel_unarchive<S, B>(
  State(engine): State<Arc<Engine<S, B>>>,
  Path((id, bedspace_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Transition>, ApiError>
where
  S: AccommodationStore,
  B: EventBus,
{
  respond(engine.bedspaces().cancel_scheduled_unarchive(id, bedspace_id).await)
}
