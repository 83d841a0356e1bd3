//! Handlers for `/share` endpoints: the targets of share links.
//!
//! Both forms validate the token and return the decoded payload, so a client
//! can preview a share before merging it.

use axum::{
  Json,
  extract::{Path, Query, State, rejection::QueryRejection},
};
use rapport_core::{payload::SharePayload, store::ShareStore, token};
use serde::{Deserialize, Serialize};

use crate::{ApiState, alias::lookup, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ShareParams {
  #[serde(default)]
  pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
  pub ok:              bool,
  pub payload:         SharePayload,
  /// Set when the sender restricted how far this share may travel.
  pub privacy_warning: bool,
}

impl ShareResponse {
  fn from_token(token: &str) -> Result<Self, ApiError> {
    let payload = token::decode(token)?;
    Ok(Self {
      ok: true,
      privacy_warning: payload.privacy.requires_warning(),
      payload,
    })
  }
}

/// `GET /share?token=<TOKEN>`
pub async fn by_token(
  params: Result<Query<ShareParams>, QueryRejection>,
) -> Result<Json<ShareResponse>, ApiError> {
  let Query(params) = params?;
  if params.token.trim().is_empty() {
    return Err(ApiError::BadRequest("token is required".into()));
  }
  Ok(Json(ShareResponse::from_token(&params.token)?))
}

/// `GET /share/:slug`
pub async fn by_alias<S>(
  State(state): State<ApiState<S>>,
  Path(slug): Path<String>,
) -> Result<Json<ShareResponse>, ApiError>
where
  S: ShareStore,
{
  let token = lookup(&*state.store, &slug).await?;
  Ok(Json(ShareResponse::from_token(&token)?))
}
