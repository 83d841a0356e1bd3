//! The `ShareStore` trait: server-side persistence for aliases and the
//! exchange mailbox.
//!
//! The trait is implemented by storage backends (e.g. `rapport-store-sqlite`).
//! `rapport-api` depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  alias::Alias,
  exchange::{ExchangeRecord, NewExchange},
};

/// Outcome of [`ShareStore::put_alias`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasWrite {
  /// The slug was free and now maps to the token.
  Created,
  /// The slug already mapped to the same token; its expiry was extended.
  Refreshed,
  /// The slug maps to a different token. Nothing was written.
  Taken,
}

/// Abstraction over the server's alias table and exchange mailbox.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ShareStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Aliases ───────────────────────────────────────────────────────────

  /// Insert `alias`, or refresh its expiry if the slug already holds the
  /// same token. An expired alias may be overwritten by any token.
  fn put_alias(
    &self,
    alias: Alias,
  ) -> impl Future<Output = Result<AliasWrite, Self::Error>> + Send + '_;

  /// Look up a slug. Expired aliases are reported as `None`.
  fn get_alias<'a>(
    &'a self,
    slug: &'a str,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Alias>, Self::Error>> + Send + 'a;

  // ── Exchange mailbox ──────────────────────────────────────────────────

  /// Queue a reciprocal payload as `pending`.
  fn enqueue_exchange(
    &self,
    new: NewExchange,
  ) -> impl Future<Output = Result<ExchangeRecord, Self::Error>> + Send + '_;

  /// Atomically select up to `limit` pending records for `target_id`, oldest
  /// first, and mark them delivered. Selection and marking are one step: a
  /// record returned here is never returned by any other call.
  fn drain_exchanges<'a>(
    &'a self,
    target_id: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ExchangeRecord>, Self::Error>> + Send + 'a;
}
