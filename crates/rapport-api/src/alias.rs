//! Handlers for `/alias` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/alias` | Body: `{"token":"rp1.…"}`; a full share link is accepted too |
//! | `GET`  | `/alias/:slug` | 404 "link has expired" if unknown or expired |

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
};
use chrono::Utc;
use rapport_core::{
  alias,
  link::{ShareRef, alias_link},
  store::ShareStore,
  token,
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  error::{ApiError, store_error},
};

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
  pub ok:   bool,
  pub slug: String,
  pub url:  String,
}

/// `POST /alias`
///
/// Shortening the same token twice returns the same slug and pushes its
/// expiry forward.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError>
where
  S: ShareStore,
{
  let Json(body) = body?;

  let token = match ShareRef::parse(&body.token)? {
    ShareRef::Token(t) => t,
    ShareRef::Alias(_) => {
      return Err(ApiError::BadRequest("expected a share token, not an alias".into()));
    }
  };
  // Never hand out a short link to something that will not decode.
  token::decode(&token)?;

  let slug = alias::allocate(&*state.store, &token, state.settings.alias_ttl, Utc::now())
    .await
    .map_err(store_error)?
    .ok_or_else(|| ApiError::Conflict("no free alias for this token".into()))?;

  tracing::info!(%slug, "alias issued");
  Ok(Json(CreateResponse {
    ok:   true,
    url:  alias_link(&state.settings.base_url, &slug),
    slug,
  }))
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
  pub ok:    bool,
  pub token: String,
}

/// `GET /alias/:slug`
pub async fn resolve<S>(
  State(state): State<ApiState<S>>,
  Path(slug): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError>
where
  S: ShareStore,
{
  let token = lookup(&*state.store, &slug).await?;
  Ok(Json(ResolveResponse { ok: true, token }))
}

/// Fetch the live token behind `slug`.
pub(crate) async fn lookup<S: ShareStore>(store: &S, slug: &str) -> Result<String, ApiError> {
  store
    .get_alias(slug, Utc::now())
    .await
    .map_err(store_error)?
    .map(|a| a.token)
    .ok_or(ApiError::StaleAlias)
}
