//! Share links: building them, and recovering a token or alias from whatever
//! the receiver pasted or scanned.
//!
//! Accepted shapes:
//!
//! | Input | Result |
//! |-------|--------|
//! | `https://host/share?token=rp1.…` | token |
//! | `https://host/share/<slug>` | alias |
//! | anything containing `rp1.…` (rewrapped redirect links, chat previews) | token |
//! | a bare slug | alias |

use crate::{
  Error, Result,
  alias::{MAX_SLUG_LEN, SLUG_LEN},
  payload::SharePayload,
  token::{self, Capacity, is_body_char, split_marker},
};

/// `{base}/share?token={token}`
pub fn token_link(base_url: &str, token: &str) -> String {
  format!("{}/share?token={token}", base_url.trim_end_matches('/'))
}

/// `{base}/share/{slug}`
pub fn alias_link(base_url: &str, slug: &str) -> String {
  format!("{}/share/{slug}", base_url.trim_end_matches('/'))
}

// ─── Preparing a share ───────────────────────────────────────────────────────

/// The encoded token, its full link, and how that link measures against the
/// QR ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedShare {
  pub token:    String,
  pub link:     String,
  pub capacity: Capacity,
}

/// Encode `payload` and measure the resulting link. Never touches the network,
/// so overflow is known before any alias round trip is attempted.
pub fn prepare(base_url: &str, payload: &SharePayload) -> Result<PreparedShare> {
  let token = token::encode(payload)?;
  let link = token_link(base_url, &token);
  let capacity = Capacity::measure(&link);
  Ok(PreparedShare { token, link, capacity })
}

// ─── Parsing what the receiver has ───────────────────────────────────────────

/// What a pasted or scanned string refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareRef {
  /// A self-contained token; resolving it needs no network call.
  Token(String),
  /// A server-held alias slug.
  Alias(String),
}

impl ShareRef {
  pub fn parse(input: &str) -> Result<Self> {
    let input = input.trim();

    if let Some(token) = extract_token(input) {
      return Ok(Self::Token(token.to_owned()));
    }

    if let Some(slug) = slug_after_share_path(input) {
      return Ok(Self::Alias(slug.to_owned()));
    }

    if is_slug(input) {
      return Ok(Self::Alias(input.to_owned()));
    }

    Err(Error::CorruptToken("no share token or alias found".into()))
  }
}

/// Find a marked token anywhere in `input`.
///
/// Every `rp<N>.` occurrence is a candidate, including ones glued to a
/// percent-escape (`%3Drp1.`); the longest one wins, which keeps host names
/// such as `rp1.example.com` from shadowing the real token further along.
pub fn extract_token(input: &str) -> Option<&str> {
  let mut best: Option<&str> = None;

  for (start, _) in input.match_indices("rp") {
    let rest = &input[start..];
    let Some((_, body)) = split_marker(rest) else {
      continue;
    };
    let body_len = body.find(|c: char| !is_body_char(c)).unwrap_or(body.len());
    if body_len == 0 {
      continue;
    }

    let candidate = &rest[..rest.len() - body.len() + body_len];
    if best.is_none_or(|b| candidate.len() > b.len()) {
      best = Some(candidate);
    }
  }

  best
}

fn slug_after_share_path(input: &str) -> Option<&str> {
  let (_, after) = input.split_once("/share/")?;
  let end = after.find(['/', '?', '#']).unwrap_or(after.len());
  let slug = &after[..end];
  is_slug(slug).then_some(slug)
}

fn is_slug(s: &str) -> bool {
  (SLUG_LEN..=MAX_SLUG_LEN).contains(&s.len()) && s.chars().all(is_body_char)
}
