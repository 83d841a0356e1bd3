//! [`ContactBook`]: the client's single writer for the local contact list.

use std::sync::{Mutex, PoisonError};

use rapport_core::{
  Error as CoreError,
  contact::Contact,
  exchange::ExchangeDelivery,
  merge::{ContactMerger, ContactRepository, MergeOutcome},
  payload::SharePayload,
};

use crate::{
  Result,
  events::{BookEvent, EventBus},
};

type Backlog = Mutex<Vec<ExchangeDelivery>>;

/// Serializes merges against one repository and announces what changed.
///
/// Every path that mutates the contact list (scanning a link, a mailbox
/// delivery) goes through here, so load/merge/save cycles never interleave.
pub struct ContactBook<R> {
  merger:   Mutex<ContactMerger<R>>,
  events:   EventBus,
  /// Deliveries the server already handed over whose merge could not be
  /// saved, oldest first.
  deferred: Backlog,
}

impl<R: ContactRepository> ContactBook<R> {
  pub fn new(repository: R) -> Self {
    Self {
      merger:   Mutex::new(ContactMerger::new(repository)),
      events:   EventBus::new(),
      deferred: Backlog::default(),
    }
  }

  pub fn events(&self) -> &EventBus { &self.events }

  /// Merge a payload the user scanned or pasted.
  pub fn merge(&self, payload: &SharePayload) -> Result<MergeOutcome> {
    let outcome = {
      let merger = self.merger.lock().unwrap_or_else(PoisonError::into_inner);
      merger.merge(payload)?
    };

    let remote_id = payload.owner.id.clone();
    if outcome.was_created {
      tracing::info!(remote = %remote_id, facts = outcome.added_facts, "contact created");
      self.events.publish(BookEvent::ContactCreated {
        contact_id: outcome.contact.id,
        remote_id,
        name: outcome.contact.name.clone(),
        facts: outcome.added_facts,
      });
    } else if outcome.changed {
      tracing::info!(remote = %remote_id, added = outcome.added_facts, "contact updated");
      self.events.publish(BookEvent::ContactUpdated {
        contact_id:  outcome.contact.id,
        remote_id,
        added_facts: outcome.added_facts,
      });
    }

    Ok(outcome)
  }

  /// Merge a mailbox delivery and announce it.
  pub fn merge_delivery(&self, delivery: &ExchangeDelivery) -> Result<MergeOutcome> {
    let outcome = self.merge(&delivery.payload)?;
    self.events.publish(BookEvent::ExchangeMerged {
      exchange_id:  delivery.id,
      initiator_id: delivery.initiator_id.clone(),
      contact_id:   outcome.contact.id,
    });
    Ok(outcome)
  }

  /// Merge a delivery that is no longer on the server.
  ///
  /// When the save fails, or older deliveries are still held back, the
  /// delivery joins the backlog and `Ok(None)` is returned. Nothing accepted
  /// here is dropped for a storage error.
  pub fn accept_delivery(&self, delivery: ExchangeDelivery) -> Result<Option<MergeOutcome>> {
    let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
    if !deferred.is_empty() {
      deferred.push(delivery);
      return Ok(None);
    }

    match self.merge_delivery(&delivery) {
      Ok(outcome) => Ok(Some(outcome)),
      Err(e) if e.is_storage_failure() => {
        tracing::warn!(exchange = %delivery.id, error = %e, "delivery held for retry");
        deferred.push(delivery);
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// Retry held-back deliveries in arrival order, stopping at the first one
  /// that still cannot be saved. Returns how many were merged.
  pub fn retry_deferred(&self) -> usize {
    let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
    let mut merged = 0;

    while let Some(delivery) = deferred.first() {
      match self.merge_delivery(delivery) {
        Ok(_) => merged += 1,
        Err(e) if e.is_storage_failure() => {
          tracing::warn!(exchange = %delivery.id, error = %e, "deferred delivery still failing");
          break;
        }
        Err(e) => tracing::warn!(exchange = %delivery.id, error = %e, "deferred delivery dropped"),
      }
      deferred.remove(0);
    }

    merged
  }

  /// Number of deliveries waiting for a successful save.
  pub fn deferred_count(&self) -> usize {
    self.deferred.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  /// A snapshot of every stored contact.
  pub fn contacts(&self) -> Result<Vec<Contact>> {
    let merger = self.merger.lock().unwrap_or_else(PoisonError::into_inner);
    let contacts = merger
      .repository()
      .load()
      .map_err(|e| CoreError::Repository(Box::new(e)))?;
    Ok(contacts)
  }
}
