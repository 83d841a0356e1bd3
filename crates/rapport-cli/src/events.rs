//! Typed notifications about changes to the local contact book.
//!
//! Published only after the change has been saved, so a subscriber that
//! reloads the book on an event always sees the new state.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the event channel; slow subscribers see `Lagged` past this.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
  ContactCreated {
    contact_id: Uuid,
    remote_id:  String,
    name:       String,
    facts:      usize,
  },
  ContactUpdated {
    contact_id:  Uuid,
    remote_id:   String,
    added_facts: usize,
  },
  /// A mailbox delivery was merged.
  ExchangeMerged {
    exchange_id:  Uuid,
    initiator_id: String,
    contact_id:   Uuid,
  },
}

/// Fan-out channel for [`BookEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<BookEvent>,
}

impl Default for EventBus {
  fn default() -> Self { Self::new() }
}

impl EventBus {
  pub fn new() -> Self {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> { self.tx.subscribe() }

  /// Send to every current subscriber. Having none is fine.
  pub fn publish(&self, event: BookEvent) {
    let _ = self.tx.send(event);
  }
}
