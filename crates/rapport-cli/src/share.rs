//! Sharing and receiving: from a profile to a scannable link, and from
//! whatever the receiver pasted back to a validated payload.

use qrcode::{EcLevel, QrCode, render::unicode};
use rapport_core::{
  link::{self, ShareRef},
  payload::SharePayload,
  token::{self, Capacity},
};

use crate::{Result, client::AliasService};

/// When to ask the server for a short link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortenPolicy {
  /// Never; an oversized link is an error.
  Never,
  /// Only when the full link would not fit in a QR code.
  #[default]
  OnOverflow,
  Always,
}

/// A link ready to hand over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
  pub link:      String,
  pub token:     String,
  /// Whether `link` is a server alias rather than the full token link.
  pub shortened: bool,
  /// How `link` measures against the QR ceiling.
  pub capacity:  Capacity,
}

impl ShareLink {
  pub fn fits_qr(&self) -> bool { !self.capacity.overflows() }
}

/// Encode `payload` and produce the link to show.
///
/// Capacity is measured before any network call. If shortening fails the raw
/// link is returned instead, with its own (possibly overflowing) capacity.
pub async fn create_share<A: AliasService>(
  aliases: &A,
  base_url: &str,
  payload: &SharePayload,
  policy: ShortenPolicy,
) -> Result<ShareLink> {
  let prepared = link::prepare(base_url, payload)?;

  let wants_alias = match policy {
    ShortenPolicy::Never => {
      prepared.capacity.ensure_fits()?;
      false
    }
    ShortenPolicy::OnOverflow => prepared.capacity.overflows(),
    ShortenPolicy::Always => true,
  };

  if wants_alias {
    match aliases.shorten(&prepared.token).await {
      Ok(short) => {
        return Ok(ShareLink {
          capacity:  Capacity::measure(&short),
          link:      short,
          token:     prepared.token,
          shortened: true,
        });
      }
      Err(e) => {
        tracing::warn!(error = %e, "shortening failed, falling back to the full link");
      }
    }
  }

  Ok(ShareLink {
    link:      prepared.link,
    token:     prepared.token,
    shortened: false,
    capacity:  prepared.capacity,
  })
}

/// Render `link` as a terminal QR code at the error-correction level the
/// capacity ceiling is measured against.
pub fn render_qr(link: &str) -> Result<String, qrcode::types::QrError> {
  let code = QrCode::with_error_correction_level(link.as_bytes(), EcLevel::L)?;
  Ok(
    code
      .render::<unicode::Dense1x2>()
      .dark_color(unicode::Dense1x2::Light)
      .light_color(unicode::Dense1x2::Dark)
      .build(),
  )
}

/// Turn a raw token or an alias into a token. Raw tokens never touch the
/// network.
pub async fn resolve_alias<A: AliasService>(aliases: &A, input: &str) -> Result<String> {
  match ShareRef::parse(input)? {
    ShareRef::Token(token) => Ok(token),
    ShareRef::Alias(slug) => aliases.resolve(&slug).await,
  }
}

/// Resolve and decode whatever the receiver pasted or scanned.
pub async fn receive<A: AliasService>(aliases: &A, input: &str) -> Result<SharePayload> {
  let token = resolve_alias(aliases, input).await?;
  Ok(token::decode(&token)?)
}
