//! Error types for `rapport-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The token or payload is structurally broken. Surfaced to users as
  /// "link is invalid".
  #[error("corrupt share token: {0}")]
  CorruptToken(String),

  #[error("unsupported share token version: {0}")]
  UnsupportedVersion(u64),

  #[error("share payload has no owner id")]
  MissingIdentity,

  #[error("invalid exchange: {0}")]
  InvalidExchange(String),

  #[error("share link is {length} characters, over the {limit} character limit")]
  Overflow { length: usize, limit: usize },

  #[error("contact repository error: {0}")]
  Repository(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("compression error: {0}")]
  Compression(#[from] std::io::Error),
}

impl Error {
  /// `true` for decode-time failures, which all mean "link is invalid".
  pub fn is_invalid_token(&self) -> bool {
    matches!(self, Self::CorruptToken(_) | Self::UnsupportedVersion(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
