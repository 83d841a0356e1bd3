//! The share token codec and the QR capacity check.
//!
//! A token is `rp<N>.` followed by the URL-safe, unpadded base64 of the
//! DEFLATE-compressed JSON payload. `<N>` is the token format version. The
//! marker lets receivers fish a token out of a pasted URL, and the body
//! alphabet (`A-Z a-z 0-9 - _`) never needs percent-encoding.
//!
//! Encoding is deterministic: serde_json writes struct fields in declaration
//! order and DEFLATE has no random state, so an unchanged payload always
//! yields the same token.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};

use crate::{Error, Result, payload::SharePayload};

/// Version of the token envelope (marker + compression + encoding).
pub const TOKEN_FORMAT_VERSION: u64 = 1;

/// Byte-mode capacity of a version-40 QR symbol at error-correction level L,
/// which is what share surfaces render.
pub const MAX_SAFE_LINK_LEN: usize = 2953;

const MARKER_PREFIX: &str = "rp";
const MARKER_TERMINATOR: char = '.';

/// Upper bound on the inflated JSON size; anything bigger is not a payload
/// this protocol could have produced.
const MAX_INFLATED_BYTES: u64 = 256 * 1024;

/// The marker written in front of every token this build produces.
pub fn marker() -> String {
  format!("{MARKER_PREFIX}{TOKEN_FORMAT_VERSION}{MARKER_TERMINATOR}")
}

/// Whether `c` can appear in a token body.
pub(crate) fn is_body_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Split `rp<N>.<body>` into `(N, body)`. Returns `None` if `s` does not start
/// with a marker.
pub(crate) fn split_marker(s: &str) -> Option<(u64, &str)> {
  let rest = s.strip_prefix(MARKER_PREFIX)?;
  let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
  if digits == 0 {
    return None;
  }
  let body = rest[digits..].strip_prefix(MARKER_TERMINATOR)?;
  let version = rest[..digits].parse().ok()?;
  Some((version, body))
}

// ─── Codec ───────────────────────────────────────────────────────────────────

/// Serialize `payload` into a token.
pub fn encode(payload: &SharePayload) -> Result<String> {
  let json = serde_json::to_vec(payload)?;

  let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
  encoder.write_all(&json)?;
  let compressed = encoder.finish()?;

  Ok(format!("{}{}", marker(), URL_SAFE_NO_PAD.encode(compressed)))
}

/// Parse and validate a token.
///
/// Every failure is either [`Error::CorruptToken`] or
/// [`Error::UnsupportedVersion`]; nothing is returned unless the whole
/// payload validated.
pub fn decode(token: &str) -> Result<SharePayload> {
  let token = token.trim();
  let (version, body) = split_marker(token)
    .ok_or_else(|| Error::CorruptToken("missing token marker".into()))?;

  if version != TOKEN_FORMAT_VERSION {
    return Err(Error::UnsupportedVersion(version));
  }

  // Some apps re-pad base64 when they rewrap links.
  let body = body.trim_end_matches('=');
  if body.is_empty() {
    return Err(Error::CorruptToken("empty token body".into()));
  }

  let compressed = URL_SAFE_NO_PAD
    .decode(body)
    .map_err(|e| Error::CorruptToken(format!("bad encoding: {e}")))?;

  let mut json = Vec::new();
  DeflateDecoder::new(compressed.as_slice())
    .take(MAX_INFLATED_BYTES + 1)
    .read_to_end(&mut json)
    .map_err(|e| Error::CorruptToken(format!("bad compression: {e}")))?;

  if json.len() as u64 > MAX_INFLATED_BYTES {
    return Err(Error::CorruptToken("payload too large".into()));
  }

  let value: serde_json::Value = serde_json::from_slice(&json)
    .map_err(|e| Error::CorruptToken(format!("bad json: {e}")))?;

  SharePayload::from_value(value)
}

// ─── Capacity ────────────────────────────────────────────────────────────────

/// The measured size of a shareable string against the QR ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
  pub length: usize,
  pub limit:  usize,
}

impl Capacity {
  /// Measure `link` against [`MAX_SAFE_LINK_LEN`].
  pub fn measure(link: &str) -> Self { Self::measure_against(link, MAX_SAFE_LINK_LEN) }

  /// QR byte mode counts bytes, not characters.
  pub fn measure_against(link: &str, limit: usize) -> Self {
    Self { length: link.len(), limit }
  }

  /// A link exactly at the limit still fits.
  pub fn overflows(&self) -> bool { self.length > self.limit }

  pub fn ensure_fits(&self) -> Result<()> {
    if self.overflows() {
      Err(Error::Overflow { length: self.length, limit: self.limit })
    } else {
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::{
    privacy::PrivacyLevel,
    profile::{Fact, Owner, ShareGroup},
  };

  fn sample() -> SharePayload {
    SharePayload::build(
      Owner {
        avatar: Some("https://img.example/d.png".into()),
        phone: Some("+1 555 0100".into()),
        telegram: Some("@dana".into()),
        ..Owner::new("u1", "Dana")
      },
      vec![
        ShareGroup::new("g1", "Work", "#4f46e5")
          .with_fact(Fact::new("f1", "Backend engineer"))
          .with_fact(Fact::new("f2", "Rust, Postgres, \"distributed\" things")),
        ShareGroup::new("g2", "Hobbies", "#16a34a")
          .with_fact(Fact::new("f1", "Loves chess ♟ and climbing 🧗")),
      ],
      PrivacyLevel::SecondDegree,
      Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
    )
  }

  /// Compress arbitrary JSON into a token body under the current marker.
  fn raw_token(json: &str) -> String {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(json.as_bytes()).unwrap();
    format!("{}{}", marker(), URL_SAFE_NO_PAD.encode(encoder.finish().unwrap()))
  }

  #[test]
  fn round_trip_preserves_payload() {
    let payload = sample();
    let token = encode(&payload).unwrap();
    assert_eq!(decode(&token).unwrap(), payload);
  }

  #[test]
  fn round_trip_with_empty_groups() {
    let payload = SharePayload::build(
      Owner::new("u9", "Solo"),
      vec![ShareGroup::new("g1", "Empty", "#000")],
      PrivacyLevel::Public,
      Utc.timestamp_millis_opt(0).unwrap(),
    );
    assert_eq!(decode(&encode(&payload).unwrap()).unwrap(), payload);
  }

  #[test]
  fn encoding_is_deterministic() {
    assert_eq!(encode(&sample()).unwrap(), encode(&sample()).unwrap());
  }

  #[test]
  fn token_is_url_safe_and_marked() {
    let token = encode(&sample()).unwrap();
    assert!(token.starts_with("rp1."));
    let body = &token[marker().len()..];
    assert!(body.chars().all(is_body_char), "token body: {body}");
  }

  #[test]
  fn decode_tolerates_whitespace_and_padding() {
    let token = encode(&sample()).unwrap();
    assert_eq!(decode(&format!("  {token}==\n")).unwrap(), sample());
  }

  #[test]
  fn missing_marker_is_corrupt() {
    let token = encode(&sample()).unwrap();
    let body = &token[marker().len()..];
    assert!(matches!(decode(body), Err(Error::CorruptToken(_))));
    assert!(matches!(decode(""), Err(Error::CorruptToken(_))));
    assert!(matches!(decode("rp1."), Err(Error::CorruptToken(_))));
  }

  #[test]
  fn future_marker_version_is_unsupported() {
    let token = encode(&sample()).unwrap();
    let future = token.replacen("rp1.", "rp7.", 1);
    assert!(matches!(decode(&future), Err(Error::UnsupportedVersion(7))));
  }

  #[test]
  fn future_schema_version_is_unsupported() {
    let token = raw_token(
      r#"{"v":2,"owner":{"id":"u1","name":"Dana"},"groups":[],"generatedAt":0}"#,
    );
    assert!(matches!(decode(&token), Err(Error::UnsupportedVersion(2))));
  }

  #[test]
  fn truncated_token_is_corrupt() {
    let token = encode(&sample()).unwrap();
    let truncated = &token[..token.len() / 2];
    let err = decode(truncated).unwrap_err();
    assert!(err.is_invalid_token(), "unexpected error: {err:?}");
  }

  #[test]
  fn structurally_invalid_payload_is_corrupt() {
    let token = raw_token(r#"{"v":1,"owner":{"name":"Dana"},"groups":[],"generatedAt":0}"#);
    assert!(matches!(decode(&token), Err(Error::CorruptToken(_))));

    let token = raw_token("not json at all");
    assert!(matches!(decode(&token), Err(Error::CorruptToken(_))));
  }

  #[test]
  fn direct_only_payload_has_no_channel_keys() {
    let payload = SharePayload::build(
      Owner {
        phone: Some("+15550100".into()),
        instagram: Some("dana".into()),
        ..Owner::new("u1", "Dana")
      },
      vec![],
      PrivacyLevel::DirectOnly,
      Utc.timestamp_millis_opt(0).unwrap(),
    );
    let json = serde_json::to_value(&payload).unwrap();
    let owner = json["owner"].as_object().unwrap();
    assert!(!owner.contains_key("phone"));
    assert!(!owner.contains_key("instagram"));

    let decoded = decode(&encode(&payload).unwrap()).unwrap();
    assert_eq!(decoded.owner.phone, None);
    assert_eq!(decoded.privacy, PrivacyLevel::DirectOnly);
  }

  #[test]
  fn compression_keeps_repetitive_payloads_small() {
    let mut group = ShareGroup::new("g1", "Notes", "#000");
    for i in 0..40 {
      group.facts.push(Fact::new(format!("f{i}"), "the same sentence over and over"));
    }
    let payload = SharePayload::build(
      Owner::new("u1", "Dana"),
      vec![group],
      PrivacyLevel::Public,
      Utc.timestamp_millis_opt(0).unwrap(),
    );
    let json_len = serde_json::to_vec(&payload).unwrap().len();
    let token = encode(&payload).unwrap();
    assert!(token.len() < json_len, "{} >= {json_len}", token.len());
  }

  // ── Capacity ──────────────────────────────────────────────────────────────

  #[test]
  fn link_exactly_at_the_ceiling_fits() {
    let link = "x".repeat(MAX_SAFE_LINK_LEN);
    let cap = Capacity::measure(&link);
    assert_eq!(cap.length, MAX_SAFE_LINK_LEN);
    assert!(!cap.overflows());
    assert!(cap.ensure_fits().is_ok());
  }

  #[test]
  fn one_character_over_overflows() {
    let link = "x".repeat(MAX_SAFE_LINK_LEN + 1);
    let cap = Capacity::measure(&link);
    assert!(cap.overflows());
    assert!(matches!(
      cap.ensure_fits(),
      Err(Error::Overflow { length, limit })
        if length == MAX_SAFE_LINK_LEN + 1 && limit == MAX_SAFE_LINK_LEN
    ));
  }

  #[test]
  fn capacity_counts_bytes() {
    // Four bytes in UTF-8, one character.
    let cap = Capacity::measure_against("🧗", 3);
    assert_eq!(cap.length, 4);
    assert!(cap.overflows());
  }
}
