//! The versioned share payload: the unit carried by a token or an exchange.
//!
//! A payload is never persisted on the presenting side. It is rebuilt from
//! the current profile, group selection and privacy level every time a share
//! surface is rendered.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  privacy::{self, PrivacyLevel},
  profile::{Owner, ShareGroup},
};

/// The only payload schema version this build understands.
pub const SCHEMA_VERSION: u32 = 1;

/// A privacy-filtered snapshot of a presenter's profile.
///
/// Wire form (v1):
///
/// ```json
/// { "v": 1, "owner": { "id": "...", "name": "..." }, "groups": [],
///   "generatedAt": 1700000000000, "privacy": "public" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
  pub v:            u32,
  pub owner:        Owner,
  pub groups:       Vec<ShareGroup>,
  /// Millisecond precision on the wire.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub generated_at: DateTime<Utc>,
  /// Absent or `null` in some older tokens; those are read as `public`.
  #[serde(default, deserialize_with = "null_as_default")]
  pub privacy:      PrivacyLevel,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
  D: serde::Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SharePayload {
  /// Build a payload stamped with the current time.
  pub fn new(owner: Owner, groups: Vec<ShareGroup>, privacy: PrivacyLevel) -> Self {
    Self::build(owner, groups, privacy, Utc::now())
  }

  /// Build a payload, running the owner through [`privacy::filter`] first.
  ///
  /// `generated_at` is truncated to milliseconds so the payload survives a
  /// token round trip unchanged.
  pub fn build(
    owner: Owner,
    groups: Vec<ShareGroup>,
    privacy: PrivacyLevel,
    generated_at: DateTime<Utc>,
  ) -> Self {
    Self {
      v: SCHEMA_VERSION,
      owner: privacy::filter(owner, privacy),
      groups,
      generated_at: generated_at.trunc_subsecs(3),
      privacy,
    }
  }

  /// Validate an untrusted JSON document against the versioned schema.
  ///
  /// The version is checked before anything else is read, so a payload from
  /// a newer schema is rejected rather than guess-decoded.
  pub fn from_value(value: serde_json::Value) -> Result<Self> {
    let version = value
      .get("v")
      .ok_or_else(|| Error::CorruptToken("missing schema version".into()))?
      .as_u64()
      .ok_or_else(|| Error::CorruptToken("schema version is not an integer".into()))?;

    if version != u64::from(SCHEMA_VERSION) {
      return Err(Error::UnsupportedVersion(version));
    }

    let payload: Self = serde_json::from_value(value)
      .map_err(|e| Error::CorruptToken(e.to_string()))?;

    if payload.owner.id.trim().is_empty() {
      return Err(Error::CorruptToken("owner.id is empty".into()));
    }

    Ok(payload)
  }

  /// Total number of facts across every group.
  pub fn fact_count(&self) -> usize { self.groups.iter().map(|g| g.facts.len()).sum() }

  /// Fails with [`Error::MissingIdentity`] when there is no owner id to merge on.
  pub fn require_identity(&self) -> Result<&str> {
    let id = self.owner.id.trim();
    if id.is_empty() { Err(Error::MissingIdentity) } else { Ok(id) }
  }
}
