//! Error type for the bus implementations in `haven-server`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The webhook answered with a non-success status.
  #[error("webhook rejected message with status {status}")]
  Rejected { status: u16 },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
