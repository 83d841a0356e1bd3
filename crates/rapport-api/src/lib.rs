//! JSON REST API for Rapport.
//!
//! Exposes an axum [`Router`] backed by any [`rapport_core::store::ShareStore`]:
//! the reciprocal-exchange mailbox, the alias table, and a share-link resolver.
//! TLS and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(rapport_api::api_router(store.clone(), settings))
//! ```

pub mod alias;
pub mod error;
pub mod exchange;
pub mod share;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use chrono::Duration;
use rapport_core::{exchange::DRAIN_BATCH_SIZE, store::ShareStore};
use serde_json::{Value, json};

pub use error::ApiError;

// ─── Settings ────────────────────────────────────────────────────────────────

/// Deployment knobs the handlers need.
#[derive(Debug, Clone)]
pub struct ApiSettings {
  /// Public origin that links are built against, e.g. `https://rapport.app`.
  pub base_url:   String,
  /// How long a freshly shortened alias stays resolvable.
  pub alias_ttl:  Duration,
  /// Records handed out per `GET /exchange`. Never above
  /// [`DRAIN_BATCH_SIZE`].
  pub batch_size: usize,
}

impl ApiSettings {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url:   base_url.into(),
      alias_ttl:  Duration::days(90),
      batch_size: DRAIN_BATCH_SIZE,
    }
  }

  pub(crate) fn drain_limit(&self) -> usize { self.batch_size.clamp(1, DRAIN_BATCH_SIZE) }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub settings: Arc<ApiSettings>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      settings: Arc::clone(&self.settings),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be merged into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, settings: ApiSettings) -> Router<()>
where
  S: ShareStore + 'static,
{
  let state = ApiState { store, settings: Arc::new(settings) };

  Router::new()
    .route("/health", get(health))
    // Exchange mailbox
    .route("/exchange", get(exchange::drain::<S>).post(exchange::enqueue::<S>))
    // Aliases
    .route("/alias", post(alias::create::<S>))
    .route("/alias/{slug}", get(alias::resolve::<S>))
    // Share-link resolution
    .route("/share", get(share::by_token))
    .route("/share/{slug}", get(share::by_alias::<S>))
    .with_state(state)
}

/// `GET /health`
async fn health() -> Json<Value> { Json(json!({ "ok": true })) }
