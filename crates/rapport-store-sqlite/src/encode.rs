//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps that SQL compares or orders by (`expires_at`, `created_at` in
//! the mailbox) are stored as epoch milliseconds. Informational timestamps are
//! RFC 3339 strings. Payloads are compact JSON. UUIDs are hyphenated
//! lowercase strings.

use chrono::{DateTime, Utc};
use rapport_core::{
  alias::Alias,
  exchange::{ExchangeRecord, ExchangeStatus},
  payload::SharePayload,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_ms(dt: DateTime<Utc>) -> i64 { dt.timestamp_millis() }

pub fn decode_ms(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| Error::DateParse(format!("timestamp out of range: {ms}")))
}

// ─── ExchangeStatus ──────────────────────────────────────────────────────────

pub fn encode_status(s: ExchangeStatus) -> &'static str {
  match s {
    ExchangeStatus::Pending => "pending",
    ExchangeStatus::Delivered => "delivered",
  }
}

pub fn decode_status(s: &str) -> Result<ExchangeStatus> {
  match s {
    "pending" => Ok(ExchangeStatus::Pending),
    "delivered" => Ok(ExchangeStatus::Delivered),
    other => Err(Error::UnknownStatus(other.to_owned())),
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

pub fn encode_payload(p: &SharePayload) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

/// Stored payloads go back through the versioned schema check so a row
/// written by an incompatible build surfaces as an error, not a bad merge.
pub fn decode_payload(s: &str) -> Result<SharePayload> {
  let value: serde_json::Value = serde_json::from_str(s)?;
  Ok(SharePayload::from_value(value)?)
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// An `aliases` row straight out of SQLite.
pub struct RawAlias {
  pub slug:       String,
  pub token:      String,
  pub created_at: String,
  pub expires_at: i64,
}

impl RawAlias {
  pub fn into_alias(self) -> Result<Alias> {
    Ok(Alias {
      slug:       self.slug,
      token:      self.token,
      created_at: decode_dt(&self.created_at)?,
      expires_at: decode_ms(self.expires_at)?,
    })
  }
}

/// An `exchanges` row straight out of SQLite.
pub struct RawExchange {
  pub seq:                  i64,
  pub exchange_id:          String,
  pub initiator_profile_id: String,
  pub target_profile_id:    String,
  pub payload_json:         String,
  pub status:               String,
  pub created_at:           i64,
  pub consumed_at:          Option<i64>,
}

impl RawExchange {
  pub fn into_record(self) -> Result<ExchangeRecord> {
    Ok(ExchangeRecord {
      id:                   decode_uuid(&self.exchange_id)?,
      initiator_profile_id: self.initiator_profile_id,
      target_profile_id:    self.target_profile_id,
      payload:              decode_payload(&self.payload_json)?,
      status:               decode_status(&self.status)?,
      created_at:           decode_ms(self.created_at)?,
      consumed_at:          self.consumed_at.map(decode_ms).transpose()?,
    })
  }
}

/// Column list shared by every `exchanges` read so row mapping stays in sync.
pub const EXCHANGE_COLUMNS: &str = "seq, exchange_id, initiator_profile_id, \
                                    target_profile_id, payload_json, status, \
                                    created_at, consumed_at";

pub fn raw_exchange(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawExchange> {
  Ok(RawExchange {
    seq:                  row.get(0)?,
    exchange_id:          row.get(1)?,
    initiator_profile_id: row.get(2)?,
    target_profile_id:    row.get(3)?,
    payload_json:         row.get(4)?,
    status:               row.get(5)?,
    created_at:           row.get(6)?,
    consumed_at:          row.get(7)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn millisecond_timestamps_round_trip() {
    let at = decode_ms(1_700_000_000_123).unwrap();
    assert_eq!(encode_ms(at), 1_700_000_000_123);
  }

  #[test]
  fn unknown_status_is_an_error() {
    assert!(matches!(decode_status("lost"), Err(Error::UnknownStatus(_))));
    assert_eq!(decode_status("pending").unwrap(), ExchangeStatus::Pending);
  }
}
