//! Server-held aliases: short opaque slugs standing in for full tokens.
//!
//! Slugs are derived from the token itself (SHA-256, URL-safe base64), so
//! shortening the same token twice yields the same slug. A collision with a
//! different token lengthens the slug until it is unique.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::{AliasWrite, ShareStore};

/// Length of a freshly allocated slug.
pub const SLUG_LEN: usize = 10;

/// Length of the full base64 encoding of a SHA-256 digest.
pub const MAX_SLUG_LEN: usize = 43;

/// How much a slug grows after each collision.
const SLUG_GROWTH: usize = 4;

/// A stored slug → token mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
  pub slug:       String,
  pub token:      String,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl Alias {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

/// The first `len` characters of the token's digest.
pub fn slug_for(token: &str, len: usize) -> String {
  let digest = Sha256::digest(token.as_bytes());
  let mut slug = URL_SAFE_NO_PAD.encode(digest);
  slug.truncate(len.clamp(1, MAX_SLUG_LEN));
  slug
}

/// Store (or refresh) an alias for `token`, returning its slug.
///
/// Returns `Ok(None)` only if every slug length collided, which would take a
/// full SHA-256 collision.
pub async fn allocate<S: ShareStore>(
  store: &S,
  token: &str,
  ttl: Duration,
  now: DateTime<Utc>,
) -> Result<Option<String>, S::Error> {
  let mut len = SLUG_LEN;
  loop {
    let alias = Alias {
      slug:       slug_for(token, len),
      token:      token.to_owned(),
      created_at: now,
      expires_at: now + ttl,
    };
    let slug = alias.slug.clone();

    match store.put_alias(alias).await? {
      AliasWrite::Created | AliasWrite::Refreshed => return Ok(Some(slug)),
      AliasWrite::Taken if len < MAX_SLUG_LEN => {
        len = (len + SLUG_GROWTH).min(MAX_SLUG_LEN);
      }
      AliasWrite::Taken => return Ok(None),
    }
  }
}
