//! JSON REST API for the accommodation lifecycle engine.
//!
//! Exposes an axum [`Router`] over an [`Engine`] backed by any
//! [`AccommodationStore`] and [`EventBus`]. Auth, TLS, and transport concerns
//! are the caller's responsibility; the acting user arrives as an optional
//! `X-User-Id` header.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", haven_api::api_router(engine.clone()))
//! ```

pub mod bedspaces;
pub mod error;
pub mod events;
pub mod premises;

use std::sync::Arc;

use axum::{
  Router,
  http::HeaderMap,
  routing::{get, post, put},
};
use haven_core::{Engine, outbox::EventBus, store::AccommodationStore};
use uuid::Uuid;

pub use error::ApiError;

/// Header carrying the acting user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, B>(engine: Arc<Engine<S, B>>) -> Router<()>
where
  S: AccommodationStore + 'static,
  B: EventBus + 'static,
{
  Router::new()
    // Premises
    .route("/premises/{id}", get(premises::get_one::<S, B>))
    .route("/premises/{id}/archive", post(premises::archive::<S, B>))
    .route("/premises/{id}/unarchive", post(premises::unarchive::<S, B>))
    .route("/premises/{id}/cancel-archive", put(premises::cancel_archive::<S, B>))
    .route(
      "/premises/{id}/cancel-unarchive",
      put(premises::cancel_unarchive::<S, B>),
    )
    // Bedspaces
    .route("/premises/{id}/bedspaces", get(bedspaces::list::<S, B>))
    .route(
      "/premises/{id}/bedspaces/{bedspace_id}",
      get(bedspaces::get_one::<S, B>),
    )
    .route(
      "/premises/{id}/bedspaces/{bedspace_id}/archive",
      post(bedspaces::archive::<S, B>),
    )
    .route(
      "/premises/{id}/bedspaces/{bedspace_id}/unarchive",
      post(bedspaces::unarchive::<S, B>),
    )
    .route(
      "/premises/{id}/bedspaces/{bedspace_id}/cancel-archive",
      put(bedspaces::cancel_archive::<S, B>),
    )
    .route(
      "/premises/{id}/bedspaces/{bedspace_id}/cancel-unarchive",
      put(bedspaces::cancel_unarchive::<S, B>),
    )
    // Event log
    .route("/events/{event_type}/{event_id}", get(events::get_one::<S, B>))
    .with_state(engine)
}

/// The acting user from `X-User-Id`, if present.
pub(crate) fn acting_user(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
  let Some(raw) = headers.get(USER_ID_HEADER) else {
    return Ok(None);
  };
  raw
    .to_str()
    .ok()
    .and_then(|s| Uuid::parse_str(s.trim()).ok())
    .map(Some)
    .ok_or_else(|| ApiError::BadRequest(format!("{USER_ID_HEADER} must be a UUID")))
}
