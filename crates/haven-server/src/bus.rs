//! [`EventBus`] implementations selectable from configuration.
//!
//! - [`LogBus`] writes each envelope to the tracing log. Useful in
//!   development and wherever delivery is picked up from the logs.
//! - [`WebhookBus`] POSTs each envelope as JSON to a configured URL.

use std::time::Duration;

use haven_core::{event::Envelope, outbox::EventBus};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result};

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 { 10 }

/// `[bus]` section of the server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BusConfig {
  #[default]
  Log,
  Webhook {
    url:          String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
  },
}

// ─── Log bus ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LogBus;

impl EventBus for LogBus {
  type Error = Error;

  async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
    let message = serde_json::to_string(envelope)?;
    info!(
      topic,
      event_type = %envelope.event_type,
      event_id = %envelope.event.id,
      %message,
      "event published"
    );
    Ok(())
  }
}

// ─── Webhook bus ─────────────────────────────────────────────────────────────

/// Body POSTed to the webhook for each message.
#[derive(Debug, Serialize)]
pub struct WebhookMessage<'a> {
  pub topic:   &'a str,
  pub message: &'a Envelope,
}

/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct WebhookBus {
  client: Client,
  url:    String,
}

impl WebhookBus {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.into() })
  }
}

impl EventBus for WebhookBus {
  type Error = Error;

  async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
    let resp = self
      .client
      .post(&self.url)
      .json(&WebhookMessage { topic, message: envelope })
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(Error::Rejected { status: resp.status().as_u16() });
    }
    Ok(())
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The bus chosen by configuration.
#[derive(Debug, Clone)]
pub enum Bus {
  Log(LogBus),
  Webhook(WebhookBus),
}

impl Bus {
  pub fn from_config(config: &BusConfig) -> Result<Self> {
    Ok(match config {
      BusConfig::Log => Self::Log(LogBus),
      BusConfig::Webhook { url, timeout_secs } => Self::Webhook(WebhookBus::new(
        url.clone(),
        Duration::from_secs(*timeout_secs),
      )?),
    })
  }
}

impl EventBus for Bus {
  type Error = Error;

  async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
    match self {
      Self::Log(bus) => bus.publish(topic, envelope).await,
      Self::Webhook(bus) => bus.publish(topic, envelope).await,
    }
  }
}
