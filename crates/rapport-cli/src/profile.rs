//! The sharer's own profile: a hand-edited TOML file plus a stable profile id
//! generated on first use.
//!
//! ```toml
//! privacy = "public"
//!
//! [owner]
//! name  = "Dana"
//! phone = "+1 555 0100"
//!
//! [[groups]]
//! id    = "g1"
//! name  = "Work"
//! color = "#336699"
//! facts = [{ id = "f1", text = "Works at Acme" }]
//! ```

use std::{
  io::ErrorKind,
  path::Path,
};

use rapport_core::{
  payload::SharePayload,
  privacy::PrivacyLevel,
  profile::{Owner, ShareGroup},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ClientError, Result};

const PROFILE_ID_FILE: &str = "profile_id";

/// Owner fields as written in the profile file. The id is not user-editable.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerFields {
  pub name:      String,
  #[serde(default)]
  pub avatar:    Option<String>,
  #[serde(default)]
  pub phone:     Option<String>,
  #[serde(default)]
  pub telegram:  Option<String>,
  #[serde(default)]
  pub instagram: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
  pub owner:   OwnerFields,
  /// Default privacy for shares; overridable per share.
  #[serde(default)]
  pub privacy: PrivacyLevel,
  #[serde(default)]
  pub groups:  Vec<ShareGroup>,
}

impl Profile {
  pub fn load(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
      if e.kind() == ErrorKind::NotFound {
        ClientError::Profile(format!("no profile at {}", path.display()))
      } else {
        e.into()
      }
    })?;
    Self::parse(&raw)
  }

  pub fn parse(raw: &str) -> Result<Self> {
    let profile: Self = toml::from_str(raw)?;
    if profile.owner.name.trim().is_empty() {
      return Err(ClientError::Profile("owner.name must not be empty".into()));
    }
    Ok(profile)
  }

  pub fn owner(&self, profile_id: &str) -> Owner {
    Owner {
      id:        profile_id.to_owned(),
      name:      self.owner.name.clone(),
      avatar:    self.owner.avatar.clone(),
      phone:     self.owner.phone.clone(),
      telegram:  self.owner.telegram.clone(),
      instagram: self.owner.instagram.clone(),
    }
  }

  /// Build the payload for a share.
  ///
  /// An empty `group_ids` shares every group. Naming a group the profile does
  /// not have is an error rather than a silently smaller share.
  pub fn payload(
    &self,
    profile_id: &str,
    group_ids: &[String],
    privacy: Option<PrivacyLevel>,
  ) -> Result<SharePayload> {
    let groups = if group_ids.is_empty() {
      self.groups.clone()
    } else {
      group_ids
        .iter()
        .map(|id| {
          self
            .groups
            .iter()
            .find(|g| &g.id == id)
            .cloned()
            .ok_or_else(|| ClientError::Profile(format!("no group with id {id:?}")))
        })
        .collect::<Result<Vec<_>>>()?
    };

    Ok(SharePayload::new(
      self.owner(profile_id),
      groups,
      privacy.unwrap_or(self.privacy),
    ))
  }
}

/// The id this installation shares under, created on first call.
pub fn profile_id(data_dir: &Path) -> Result<String> {
  let path = data_dir.join(PROFILE_ID_FILE);
  match std::fs::read_to_string(&path) {
    Ok(id) if !id.trim().is_empty() => return Ok(id.trim().to_owned()),
    Ok(_) => {}
    Err(e) if e.kind() == ErrorKind::NotFound => {}
    Err(e) => return Err(e.into()),
  }

  std::fs::create_dir_all(data_dir)?;
  let id = Uuid::new_v4().to_string();
  std::fs::write(&path, format!("{id}\n"))?;
  tracing::info!(%id, "generated profile id");
  Ok(id)
}
