//! In-memory stand-ins for the server, for unit tests.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use rapport_core::{
  alias::{SLUG_LEN, slug_for},
  exchange::RawDelivery,
  link::alias_link,
  payload::SharePayload,
};

use crate::{
  ClientError, Result,
  client::{AliasService, Mailbox},
};

fn offline_error() -> ClientError {
  ClientError::Server { status: 503, message: "offline".into() }
}

// ─── Aliases ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAliases {
  slugs:   Mutex<HashMap<String, String>>,
  calls:   AtomicUsize,
  offline: bool,
}

impl FakeAliases {
  pub fn offline() -> Self { Self { offline: true, ..Self::default() } }

  /// Network round trips made so far.
  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl AliasService for FakeAliases {
  async fn shorten<'a>(&'a self, token: &'a str) -> Result<String> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.offline {
      return Err(offline_error());
    }
    let slug = slug_for(token, SLUG_LEN);
    self.slugs.lock().unwrap().insert(slug.clone(), token.to_owned());
    Ok(alias_link("https://rapport.test", &slug))
  }

  async fn resolve<'a>(&'a self, slug: &'a str) -> Result<String> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.offline {
      return Err(offline_error());
    }
    self.slugs.lock().unwrap().get(slug).cloned().ok_or(ClientError::StaleAlias)
  }
}

// ─── Mailbox ─────────────────────────────────────────────────────────────────

/// A mailbox whose drains hand out queued batches in order.
#[derive(Default)]
pub struct FakeMailbox {
  batches:  Mutex<VecDeque<Result<Vec<RawDelivery>>>>,
  pub sent: Mutex<Vec<(String, String, SharePayload)>>,
  drains:   AtomicUsize,
  /// Set while a drain is in flight; a second concurrent drain panics.
  busy:     std::sync::atomic::AtomicBool,
  delay:    Option<std::time::Duration>,
}

impl FakeMailbox {
  pub fn with_delay(delay: std::time::Duration) -> Self {
    Self { delay: Some(delay), ..Self::default() }
  }

  pub fn push_batch(&self, batch: Vec<RawDelivery>) {
    self.batches.lock().unwrap().push_back(Ok(batch));
  }

  pub fn push_failure(&self) { self.batches.lock().unwrap().push_back(Err(offline_error())); }

  pub fn drains(&self) -> usize { self.drains.load(Ordering::SeqCst) }
}

impl Mailbox for FakeMailbox {
  async fn send<'a>(
    &'a self,
    initiator_id: &'a str,
    target_id: &'a str,
    payload: &'a SharePayload,
  ) -> Result<()> {
    self
      .sent
      .lock()
      .unwrap()
      .push((initiator_id.to_owned(), target_id.to_owned(), payload.clone()));
    Ok(())
  }

  async fn drain<'a>(&'a self, _profile_id: &'a str) -> Result<Vec<RawDelivery>> {
    assert!(!self.busy.swap(true, Ordering::SeqCst), "overlapping drains");
    self.drains.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    let next = self.batches.lock().unwrap().pop_front();
    self.busy.store(false, Ordering::SeqCst);
    next.unwrap_or_else(|| Ok(Vec::new()))
  }
}
