//! The exchange poller: drains the mailbox on a fixed interval and merges
//! each delivery, one batch at a time.

use std::{sync::Arc, time::Duration};

use rapport_core::{exchange::RawDelivery, merge::ContactRepository};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{Result, book::ContactBook, client::Mailbox};

#[derive(Debug, Clone)]
pub struct PollerConfig {
  pub profile_id: String,
  pub interval:   Duration,
}

/// What one drain produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
  pub delivered: usize,
  pub merged:    usize,
  /// Deliveries dropped because their payload failed validation.
  pub rejected:  usize,
  /// Deliveries held in memory until the contact store accepts a save.
  pub deferred:  usize,
}

/// Drain one batch and merge it.
pub async fn poll_once<M, R>(mailbox: &M, book: &ContactBook<R>, profile_id: &str) -> Result<PollReport>
where
  M: Mailbox,
  R: ContactRepository,
{
  let batch = mailbox.drain(profile_id).await?;
  Ok(merge_batch(book, batch))
}

/// Merge deliveries in the order the server handed them out, after anything
/// held back from an earlier batch.
fn merge_batch<R: ContactRepository>(book: &ContactBook<R>, batch: Vec<RawDelivery>) -> PollReport {
  let mut report = PollReport {
    delivered: batch.len(),
    merged: book.retry_deferred(),
    ..PollReport::default()
  };

  for raw in batch {
    let id = raw.id;
    let accepted = raw
      .validate()
      .map_err(crate::ClientError::from)
      .and_then(|delivery| book.accept_delivery(delivery));

    match accepted {
      Ok(Some(_)) => report.merged += 1,
      Ok(None) => {}
      Err(e) => {
        tracing::warn!(exchange = %id, error = %e, "delivery rejected");
        report.rejected += 1;
      }
    }
  }

  report.deferred = book.deferred_count();
  report
}

// ─── Background loop ─────────────────────────────────────────────────────────

/// Handle to a running poller. Dropping it cancels the loop.
pub struct PollHandle {
  cancel: CancellationToken,
  task:   JoinHandle<()>,
  _guard: DropGuard,
}

impl PollHandle {
  /// Signal the loop to stop without waiting for it.
  pub fn cancel(&self) { self.cancel.cancel(); }

  pub fn is_finished(&self) -> bool { self.task.is_finished() }

  /// Stop the loop and wait for it to exit. A drain already in flight is
  /// allowed to finish; its results are discarded.
  pub async fn stop(self) -> std::result::Result<(), JoinError> {
    self.cancel.cancel();
    self.task.await
  }
}

/// Spawn the poll loop.
///
/// Polls are strictly sequential: the next drain starts only after the
/// previous batch has been merged and the interval has elapsed.
pub fn start_polling<M, R>(
  mailbox: Arc<M>,
  book: Arc<ContactBook<R>>,
  config: PollerConfig,
) -> PollHandle
where
  M: Mailbox + 'static,
  R: ContactRepository + 'static,
{
  let cancel = CancellationToken::new();
  let task = tokio::spawn(run(mailbox, book, config, cancel.clone()));
  PollHandle {
    _guard: cancel.clone().drop_guard(),
    cancel,
    task,
  }
}

async fn run<M, R>(
  mailbox: Arc<M>,
  book: Arc<ContactBook<R>>,
  config: PollerConfig,
  cancel: CancellationToken,
) where
  M: Mailbox,
  R: ContactRepository,
{
  tracing::debug!(profile = %config.profile_id, interval = ?config.interval, "poller started");

  loop {
    let drained = mailbox.drain(&config.profile_id).await;
    if cancel.is_cancelled() {
      tracing::debug!("poller cancelled; discarding in-flight drain");
      break;
    }

    match drained {
      Ok(batch) => {
        let report = merge_batch(&book, batch);
        if report.delivered > 0 || report.deferred > 0 {
          tracing::info!(
            delivered = report.delivered,
            merged = report.merged,
            rejected = report.rejected,
            deferred = report.deferred,
            "exchanges received"
          );
        } else {
          tracing::debug!("poll: nothing pending");
        }
      }
      // Queue state is untouched by a failed drain; the next tick retries.
      Err(e) => tracing::warn!(error = %e, "drain failed"),
    }

    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(config.interval) => {}
    }
  }

  tracing::debug!("poller stopped");
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use chrono::Utc;
  use rapport_core::{
    contact::Contact,
    merge::MemoryRepository,
    payload::SharePayload,
    privacy::PrivacyLevel,
    profile::{Fact, Owner, ShareGroup},
  };
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::{events::BookEvent, fakes::FakeMailbox};

  fn delivery(owner_id: &str, facts: &[&str]) -> RawDelivery {
    let mut group = ShareGroup::new("g1", "Work", "#336699");
    for id in facts {
      group = group.with_fact(Fact::new(*id, format!("fact {id}")));
    }
    let payload = SharePayload::new(Owner::new(owner_id, "Sender"), vec![group], PrivacyLevel::Public);
    RawDelivery {
      id:           Uuid::new_v4(),
      initiator_id: owner_id.into(),
      created_at:   Utc::now(),
      payload:      serde_json::to_value(payload).unwrap(),
    }
  }

  fn config(interval: Duration) -> PollerConfig {
    PollerConfig { profile_id: "me".into(), interval }
  }

  async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
      if check() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
  }

  #[tokio::test]
  async fn poll_once_merges_in_order_and_skips_invalid() {
    let mailbox = FakeMailbox::default();
    let mut bad = delivery("u9", &["f1"]);
    bad.payload = json!({ "v": 9, "owner": { "id": "u9", "name": "X" }, "groups": [] });
    mailbox.push_batch(vec![delivery("u1", &["f1"]), bad, delivery("u1", &["f1", "f2"])]);

    let book = ContactBook::new(MemoryRepository::default());
    let report = poll_once(&mailbox, &book, "me").await.unwrap();
    assert_eq!(report, PollReport { delivered: 3, merged: 2, rejected: 1, deferred: 0 });

    let contacts = book.contacts().unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].fact_count(), 2);
  }

  /// Saves fail while `failing` is set.
  #[derive(Default)]
  struct FlakyRepository {
    inner:   MemoryRepository,
    failing: Arc<AtomicBool>,
  }

  impl ContactRepository for FlakyRepository {
    type Error = std::io::Error;

    fn load(&self) -> std::result::Result<Vec<Contact>, Self::Error> {
      Ok(self.inner.load().unwrap_or_default())
    }

    fn save(&self, contacts: &[Contact]) -> std::result::Result<(), Self::Error> {
      if self.failing.load(Ordering::SeqCst) {
        return Err(std::io::Error::other("disk full"));
      }
      self.inner.save(contacts).map_err(std::io::Error::other)
    }
  }

  #[tokio::test]
  async fn failed_saves_are_retried_before_the_next_batch() {
    let mailbox = FakeMailbox::default();
    mailbox.push_batch(vec![delivery("u1", &["f1"]), delivery("u2", &["f1"])]);
    mailbox.push_batch(vec![delivery("u3", &["f1"])]);

    let failing = Arc::new(AtomicBool::new(true));
    let book = ContactBook::new(FlakyRepository { failing: failing.clone(), ..Default::default() });
    let first = poll_once(&mailbox, &book, "me").await.unwrap();
    assert_eq!(first, PollReport { delivered: 2, merged: 0, rejected: 0, deferred: 2 });
    assert!(book.contacts().unwrap().is_empty());

    failing.store(false, Ordering::SeqCst);
    let second = poll_once(&mailbox, &book, "me").await.unwrap();
    assert_eq!(second, PollReport { delivered: 1, merged: 3, rejected: 0, deferred: 0 });

    let mut remotes: Vec<_> = book
      .contacts()
      .unwrap()
      .into_iter()
      .filter_map(|c| c.remote_id)
      .collect();
    remotes.sort();
    assert_eq!(remotes, ["u1", "u2", "u3"]);
  }

  #[tokio::test]
  async fn poll_once_surfaces_drain_failure() {
    let mailbox = FakeMailbox::default();
    mailbox.push_failure();
    let book = ContactBook::new(MemoryRepository::default());
    assert!(poll_once(&mailbox, &book, "me").await.is_err());
  }

  #[tokio::test]
  async fn loop_delivers_batches_and_survives_failures() {
    let mailbox = Arc::new(FakeMailbox::default());
    mailbox.push_batch(vec![delivery("u1", &["f1"])]);
    mailbox.push_failure();
    mailbox.push_batch(vec![delivery("u2", &["f1"])]);

    let book = Arc::new(ContactBook::new(MemoryRepository::default()));
    let mut events = book.events().subscribe();
    let handle = start_polling(mailbox.clone(), book.clone(), config(Duration::from_millis(5)));

    let mut merged = Vec::new();
    while merged.len() < 2 {
      if let BookEvent::ExchangeMerged { initiator_id, .. } = events.recv().await.unwrap() {
        merged.push(initiator_id);
      }
    }
    assert_eq!(merged, ["u1", "u2"]);

    handle.stop().await.unwrap();
    assert_eq!(book.contacts().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn stop_interrupts_the_sleep() {
    let mailbox = Arc::new(FakeMailbox::default());
    let book = Arc::new(ContactBook::new(MemoryRepository::default()));
    let handle = start_polling(mailbox.clone(), book, config(Duration::from_secs(3600)));

    wait_for(|| mailbox.drains() == 1).await;
    tokio::time::timeout(Duration::from_secs(1), handle.stop())
      .await
      .expect("stop returned promptly")
      .unwrap();
    assert_eq!(mailbox.drains(), 1);
  }

  #[tokio::test]
  async fn in_flight_results_are_discarded_after_stop() {
    let mailbox = Arc::new(FakeMailbox::with_delay(Duration::from_millis(100)));
    mailbox.push_batch(vec![delivery("u1", &["f1"])]);
    let book = Arc::new(ContactBook::new(MemoryRepository::default()));
    let handle = start_polling(mailbox.clone(), book.clone(), config(Duration::from_millis(5)));

    wait_for(|| mailbox.drains() == 1).await;
    handle.stop().await.unwrap();

    assert!(book.contacts().unwrap().is_empty());
    assert_eq!(mailbox.drains(), 1);
  }

  #[tokio::test]
  async fn dropping_the_handle_stops_the_loop() {
    let mailbox = Arc::new(FakeMailbox::default());
    let book = Arc::new(ContactBook::new(MemoryRepository::default()));
    let handle = start_polling(mailbox.clone(), book, config(Duration::from_millis(5)));

    wait_for(|| mailbox.drains() >= 1).await;
    drop(handle);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let after_drop = mailbox.drains();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(mailbox.drains(), after_drop);
  }
}
