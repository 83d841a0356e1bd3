//! Contact: the receiving side's local record of someone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::ShareGroup;

/// A locally stored contact.
///
/// Contacts created from a share carry the sender's owner id in `remote_id`,
/// which anchors every later merge. Manually created contacts have none and
/// are never touched by a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
  pub id:         Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub remote_id:  Option<String>,
  pub name:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub avatar:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub telegram:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instagram:  Option<String>,
  #[serde(default)]
  pub groups:     Vec<ShareGroup>,
  /// User-authored annotations. Merges never touch these.
  #[serde(default)]
  pub notes:      Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Contact {
  /// A contact typed in by hand, with no remote identity.
  pub fn manual(name: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id:         Uuid::new_v4(),
      remote_id:  None,
      name:       name.into(),
      avatar:     None,
      phone:      None,
      telegram:   None,
      instagram:  None,
      groups:     Vec::new(),
      notes:      Vec::new(),
      created_at: now,
      updated_at: now,
    }
  }

  pub fn group(&self, group_id: &str) -> Option<&ShareGroup> {
    self.groups.iter().find(|g| g.id == group_id)
  }

  pub fn fact_count(&self) -> usize { self.groups.iter().map(|g| g.facts.len()).sum() }
}
