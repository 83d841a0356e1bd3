//! Privacy levels and the channel filter applied before serialization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profile::Owner;

/// How far the presenter is willing to let their channels travel.
///
/// Deserialization never fails on an unrecognised tag: anything unknown is
/// read as [`PrivacyLevel::DirectOnly`], the most restrictive level.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum PrivacyLevel {
  #[default]
  Public,
  SecondDegree,
  DirectOnly,
}

impl PrivacyLevel {
  /// Parse a wire tag. Unknown tags fail closed to `DirectOnly`.
  pub fn parse(tag: &str) -> Self {
    match tag.trim() {
      "public" => Self::Public,
      "second-degree" => Self::SecondDegree,
      _ => Self::DirectOnly,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Public => "public",
      Self::SecondDegree => "second-degree",
      Self::DirectOnly => "direct-only",
    }
  }

  /// Receivers must show a "please don't pass this on" banner for anything
  /// other than `public`.
  pub fn requires_warning(&self) -> bool { *self != Self::Public }

  pub fn strips_channels(&self) -> bool { *self == Self::DirectOnly }
}

impl From<String> for PrivacyLevel {
  fn from(tag: String) -> Self { Self::parse(&tag) }
}

impl fmt::Display for PrivacyLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Reduce `owner`'s contact channels according to `level`.
///
/// `public` and `second-degree` pass channels through untouched; the
/// distinction between them is enforced by the receiving UI. `direct-only`
/// removes phone, Telegram and Instagram unconditionally.
pub fn filter(owner: Owner, level: PrivacyLevel) -> Owner {
  if !level.strips_channels() {
    return owner;
  }
  Owner { phone: None, telegram: None, instagram: None, ..owner }
}
