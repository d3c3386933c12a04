//! Server wiring for the accommodation lifecycle engine: configuration, bus
//! selection, and the HTTP application.

pub mod bus;
pub mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use chrono::NaiveDate;
use haven_core::{Engine, Rules, outbox::{EventBus, OutboxConfig}, store::AccommodationStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use bus::BusConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// `[calendar]` section: dates skipped by working-day arithmetic on top of
/// weekends.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarConfig {
  #[serde(default)]
  pub holidays: Vec<NaiveDate>,
}

/// Runtime server configuration, deserialised from `config.toml` layered
/// with `HAVEN_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub events:     OutboxConfig,
  #[serde(default)]
  pub bus:        BusConfig,
  #[serde(default)]
  pub calendar:   CalendarConfig,
  #[serde(default)]
  pub rules:      Rules,
}

impl ServerConfig {
  /// Load from an optional TOML file plus the environment. Nested keys use a
  /// double underscore, e.g. `HAVEN_BUS__KIND=webhook`.
  pub fn load(path: PathBuf) -> std::result::Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("HAVEN")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }
}

// ─── Application ─────────────────────────────────────────────────────────────

/// The API router with request tracing applied.
pub fn app<S, B>(engine: Arc<Engine<S, B>>) -> Router
where
  S: AccommodationStore + 'static,
  B: EventBus + 'static,
{
  haven_api::api_router(engine).layer(TraceLayer::new_for_http())
}
