//! Error type for `rapport-cli`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
  /// The request never produced a response: DNS, connect, timeout.
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  /// The server answered with `{ ok: false, message }`.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  #[error("link has expired")]
  StaleAlias,

  #[error(transparent)]
  Core(#[from] rapport_core::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("config error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("profile error: {0}")]
  Profile(String),
}

impl ClientError {
  /// The line shown to the person at the keyboard.
  pub fn user_message(&self) -> String {
    match self {
      Self::Core(e) if e.is_invalid_token() => "link is invalid".into(),
      Self::Core(rapport_core::Error::Overflow { length, limit }) => format!(
        "this share is {length} characters, too large for a QR code (limit {limit}); \
         remove a group or fact and try again"
      ),
      Self::Core(rapport_core::Error::MissingIdentity) => {
        "this share has no sender identity and cannot be saved".into()
      }
      Self::StaleAlias => "link has expired".into(),
      Self::Network(_) => "could not reach the server; try again later".into(),
      other => other.to_string(),
    }
  }

  /// The local contact store could not be read or written.
  pub fn is_storage_failure(&self) -> bool {
    matches!(self, Self::Core(rapport_core::Error::Repository(_)) | Self::Io(_))
  }

  /// Remote failures that a later retry may fix.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Self::Network(_) | Self::Server { status: 500.., .. })
  }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
