//! HTTP server assembly for Rapport.
//!
//! Loads [`ServerConfig`], wraps the JSON API from `rapport-api` in request
//! tracing, and hands back a ready-to-serve [`Router`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use chrono::Duration;
use rapport_api::{ApiSettings, api_router};
use rapport_core::{exchange::DRAIN_BATCH_SIZE, store::ShareStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `RAPPORT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  /// Public origin written into share links, e.g. `https://rapport.app`.
  pub base_url:            String,
  pub store_path:          PathBuf,
  #[serde(default = "default_alias_ttl_days")]
  pub alias_ttl_days:      u32,
  #[serde(default = "default_batch_size")]
  pub exchange_batch_size: usize,
}

fn default_alias_ttl_days() -> u32 { 90 }

fn default_batch_size() -> usize { DRAIN_BATCH_SIZE }

impl ServerConfig {
  /// Layer an optional TOML file under `RAPPORT_*` environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8787)?
      .set_default("base_url", "http://localhost:8787")?
      .set_default("store_path", "~/.local/share/rapport/server.db")?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("RAPPORT"))
      .build()?
      .try_deserialize()
  }

  pub fn api_settings(&self) -> ApiSettings {
    ApiSettings {
      base_url:   self.base_url.clone(),
      alias_ttl:  Duration::days(i64::from(self.alias_ttl_days)),
      batch_size: self.exchange_batch_size,
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full server router: the API plus per-request tracing spans.
pub fn router<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: ShareStore + 'static,
{
  api_router(store, config.api_settings()).layer(TraceLayer::new_for_http())
}
