//! Error types for `haven-core`.
//!
//! Only fatal outcomes live here. Expected validation failures are returned as
//! [`Rejection`](crate::validation::Rejection) values inside `Ok(..)`.

use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// The transition and its event record are committed; only delivery to
  /// the bus failed.
  #[error("failed to publish lifecycle event {event_id}: {source}")]
  Publish {
    event_id: Uuid,
    #[source]
    source:   BoxError,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
