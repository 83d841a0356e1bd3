//! Profile types: what a presenter says about themselves.
//!
//! An [`Owner`] is the identity and channel snapshot of the person sharing;
//! [`ShareGroup`]s hold the self-declared facts, grouped under a stable id.

use serde::{Deserialize, Serialize};

// ─── Owner ───────────────────────────────────────────────────────────────────

/// Identity and contact-channel snapshot of the presenter.
///
/// `id` is generated once per profile and persisted; receivers use it as the
/// merge key (`Contact::remote_id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
  pub id:        String,
  pub name:      String,
  /// Image reference (URL or data URI); never the image bytes themselves.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub telegram:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instagram: Option<String>,
}

impl Owner {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self { id: id.into(), name: name.into(), ..Self::default() }
  }

  /// Whether any contact channel survives in this snapshot.
  pub fn has_channels(&self) -> bool {
    self.phone.is_some() || self.telegram.is_some() || self.instagram.is_some()
  }
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// A single user-authored statement. `id` is unique within its group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
  pub id:   String,
  pub text: String,
}

impl Fact {
  pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
    Self { id: id.into(), text: text.into() }
  }
}

/// A named, coloured, ordered collection of facts.
///
/// The group `id` survives renames and recolours, so receivers can keep
/// merging into the same local group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGroup {
  pub id:    String,
  pub name:  String,
  /// Display accent, e.g. `"#4f46e5"`.
  pub color: String,
  #[serde(default)]
  pub facts: Vec<Fact>,
}

impl ShareGroup {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    color: impl Into<String>,
  ) -> Self {
    Self {
      id:    id.into(),
      name:  name.into(),
      color: color.into(),
      facts: Vec::new(),
    }
  }

  /// Builder-style helper used heavily in tests and profile loading.
  pub fn with_fact(mut self, fact: Fact) -> Self {
    self.facts.push(fact);
    self
  }

  pub fn contains_fact(&self, fact_id: &str) -> bool {
    self.facts.iter().any(|f| f.id == fact_id)
  }
}
