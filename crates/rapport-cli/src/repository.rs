//! [`JsonFileRepository`]: the contact list as one JSON file on disk.

use std::{
  io::{ErrorKind, Write as _},
  path::{Path, PathBuf},
};

use rapport_core::{contact::Contact, merge::ContactRepository};
use tempfile::NamedTempFile;

use crate::{ClientError, Result};

/// Stores every contact in a single pretty-printed JSON array.
///
/// Saves write a sibling temp file and rename it over the target, so a crash
/// mid-save leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
  path: PathBuf,
}

impl JsonFileRepository {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  fn dir(&self) -> &Path {
    match self.path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p,
      _ => Path::new("."),
    }
  }
}

impl ContactRepository for JsonFileRepository {
  type Error = ClientError;

  fn load(&self) -> Result<Vec<Contact>> {
    let raw = match std::fs::read(&self.path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&raw)?)
  }

  fn save(&self, contacts: &[Contact]) -> Result<()> {
    std::fs::create_dir_all(self.dir())?;

    let mut tmp = NamedTempFile::new_in(self.dir())?;
    serde_json::to_writer_pretty(&mut tmp, contacts)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(&self.path).map_err(|e| e.error)?;
    Ok(())
  }
}
