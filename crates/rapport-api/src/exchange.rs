//! Handlers for the reciprocal-exchange mailbox.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/exchange` | Body: `{"initiatorId","targetId","payload"}` |
//! | `GET`  | `/exchange?profileId=<id>` | Drains up to one batch, oldest first |

use axum::{
  Json,
  extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
};
use rapport_core::{
  exchange::{ExchangeDelivery, NewExchange},
  payload::SharePayload,
  store::ShareStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  ApiState,
  error::{ApiError, store_error},
};

// ─── Enqueue ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueBody {
  #[serde(default)]
  pub initiator_id: String,
  #[serde(default)]
  pub target_id:    String,
  /// Validated against the versioned schema before anything is queued.
  pub payload:      Value,
}

#[derive(Debug, Serialize)]
pub struct Ack {
  pub ok: bool,
}

/// `POST /exchange`
///
/// A self-share is acknowledged without queueing anything.
pub async fn enqueue<S>(
  State(state): State<ApiState<S>>,
  body: Result<Json<EnqueueBody>, JsonRejection>,
) -> Result<Json<Ack>, ApiError>
where
  S: ShareStore,
{
  let Json(body) = body?;
  NewExchange::check_ids(&body.initiator_id, &body.target_id)?;
  let payload = SharePayload::from_value(body.payload)?;

  let Some(new) = NewExchange::new(&body.initiator_id, &body.target_id, payload)? else {
    tracing::debug!(profile = %body.initiator_id.trim(), "self-share ignored");
    return Ok(Json(Ack { ok: true }));
  };

  let record = state.store.enqueue_exchange(new).await.map_err(store_error)?;
  tracing::info!(
    exchange = %record.id,
    initiator = %record.initiator_profile_id,
    profile = %record.target_profile_id,
    "exchange enqueued"
  );
  Ok(Json(Ack { ok: true }))
}

// ─── Drain ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainParams {
  #[serde(default)]
  pub profile_id: String,
}

#[derive(Debug, Serialize)]
pub struct DrainResponse {
  pub ok:        bool,
  pub exchanges: Vec<ExchangeDelivery>,
}

/// `GET /exchange?profileId=<id>`
///
/// Records are marked delivered as part of the read; a record is returned by
/// at most one call.
pub async fn drain<S>(
  State(state): State<ApiState<S>>,
  params: Result<Query<DrainParams>, QueryRejection>,
) -> Result<Json<DrainResponse>, ApiError>
where
  S: ShareStore,
{
  let Query(params) = params?;
  let profile_id = params.profile_id.trim();
  if profile_id.is_empty() {
    return Err(ApiError::BadRequest("profileId is required".into()));
  }

  let records = state
    .store
    .drain_exchanges(profile_id, state.settings.drain_limit())
    .await
    .map_err(store_error)?;

  if !records.is_empty() {
    tracing::info!(profile = %profile_id, count = records.len(), "exchanges delivered");
  }

  Ok(Json(DrainResponse {
    ok:        true,
    exchanges: records.iter().map(|r| r.delivery()).collect(),
  }))
}
