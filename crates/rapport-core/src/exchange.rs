//! Reciprocal exchanges: payloads queued server-side for the original
//! presenter to pick up on their next poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, payload::SharePayload};

/// Largest batch a single drain hands out.
pub const DRAIN_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
  Pending,
  Delivered,
}

/// A queued reciprocal payload. Once `consumed_at` is set the record is never
/// handed out again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
  pub id:                   Uuid,
  pub initiator_profile_id: String,
  pub target_profile_id:    String,
  pub payload:              SharePayload,
  pub status:               ExchangeStatus,
  pub created_at:           DateTime<Utc>,
  pub consumed_at:          Option<DateTime<Utc>>,
}

impl ExchangeRecord {
  pub fn delivery(&self) -> ExchangeDelivery {
    ExchangeDelivery {
      id:           self.id,
      initiator_id: self.initiator_profile_id.clone(),
      created_at:   self.created_at,
      payload:      self.payload.clone(),
    }
  }
}

// ─── Enqueue input ───────────────────────────────────────────────────────────

/// Input to [`crate::store::ShareStore::enqueue_exchange`].
#[derive(Debug, Clone)]
pub struct NewExchange {
  pub initiator_profile_id: String,
  pub target_profile_id:    String,
  pub payload:              SharePayload,
}

impl NewExchange {
  /// Validate an enqueue request.
  ///
  /// Empty ids are an error. A self-share returns `Ok(None)`: it is accepted
  /// but never queued.
  pub fn new(
    initiator_id: &str,
    target_id: &str,
    payload: SharePayload,
  ) -> Result<Option<Self>> {
    let (initiator, target) = Self::check_ids(initiator_id, target_id)?;
    payload.require_identity()?;

    if initiator == target {
      return Ok(None);
    }

    Ok(Some(Self {
      initiator_profile_id: initiator.to_owned(),
      target_profile_id:    target.to_owned(),
      payload,
    }))
  }

  /// Trim both ids and reject empty ones. Callers holding an undecoded
  /// payload run this first so a missing id is reported as such.
  pub fn check_ids<'a>(
    initiator_id: &'a str,
    target_id: &'a str,
  ) -> Result<(&'a str, &'a str)> {
    let initiator = initiator_id.trim();
    let target = target_id.trim();

    if initiator.is_empty() {
      return Err(Error::InvalidExchange("initiatorId is required".into()));
    }
    if target.is_empty() {
      return Err(Error::InvalidExchange("targetId is required".into()));
    }
    Ok((initiator, target))
  }
}

// ─── Wire form ───────────────────────────────────────────────────────────────

/// One element of `GET /exchange`'s `exchanges` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDelivery {
  pub id:           Uuid,
  pub initiator_id: String,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub created_at:   DateTime<Utc>,
  pub payload:      SharePayload,
}

/// A delivery as read off the wire, before its payload has been validated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDelivery {
  pub id:           Uuid,
  pub initiator_id: String,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub created_at:   DateTime<Utc>,
  pub payload:      serde_json::Value,
}

impl RawDelivery {
  /// Run the payload through the versioned schema check.
  pub fn validate(self) -> Result<ExchangeDelivery> {
    Ok(ExchangeDelivery {
      id:           self.id,
      initiator_id: self.initiator_id,
      created_at:   self.created_at,
      payload:      SharePayload::from_value(self.payload)?,
    })
  }
}
