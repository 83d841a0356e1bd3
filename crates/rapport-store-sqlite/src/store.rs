//! [`SqliteStore`] — the SQLite implementation of [`ShareStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use rapport_core::{
  alias::Alias,
  exchange::{ExchangeRecord, ExchangeStatus, NewExchange},
  store::{AliasWrite, ShareStore},
};

use crate::{
  Result,
  encode::{
    EXCHANGE_COLUMNS, RawAlias, RawExchange, decode_ms, encode_dt, encode_ms,
    encode_payload, encode_status, encode_uuid, raw_exchange,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rapport share store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Delete aliases whose expiry has passed. Returns the number removed.
  pub async fn purge_expired_aliases(&self, now: DateTime<Utc>) -> Result<usize> {
    let now_ms = encode_ms(now);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM aliases WHERE expires_at <= ?1",
          rusqlite::params![now_ms],
        )?)
      })
      .await?;
    Ok(removed)
  }

  /// Number of records still waiting for `target_id`.
  pub async fn pending_count(&self, target_id: &str) -> Result<usize> {
    let target = target_id.to_owned();
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM exchanges
           WHERE target_profile_id = ?1 AND status = 'pending'",
          rusqlite::params![target],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count.max(0) as usize)
  }

  /// Every record for `target_id`, delivered or not, oldest first.
  pub async fn exchanges_for(&self, target_id: &str) -> Result<Vec<ExchangeRecord>> {
    let target = target_id.to_owned();
    let raws: Vec<RawExchange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EXCHANGE_COLUMNS} FROM exchanges
           WHERE target_profile_id = ?1
           ORDER BY created_at ASC, seq ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![target], raw_exchange)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawExchange::into_record).collect()
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }
}

// ─── ShareStore impl ─────────────────────────────────────────────────────────

impl ShareStore for SqliteStore {
  type Error = crate::Error;

  // ── Aliases ───────────────────────────────────────────────────────────────

  async fn put_alias(&self, alias: Alias) -> Result<AliasWrite> {
    let slug = alias.slug;
    let token = alias.token;
    let created_at_str = encode_dt(alias.created_at);
    let now_ms = encode_ms(alias.created_at);
    let expires_ms = encode_ms(alias.expires_at);

    // Read and write happen inside one closure, so no other call can slip
    // between the lookup and the decision.
    let outcome = self
      .conn
      .call(move |conn| {
        let existing: Option<(String, i64)> = conn
          .query_row(
            "SELECT token, expires_at FROM aliases WHERE slug = ?1",
            rusqlite::params![slug],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;

        let outcome = match existing {
          None => {
            conn.execute(
              "INSERT INTO aliases (slug, token, created_at, expires_at)
               VALUES (?1, ?2, ?3, ?4)",
              rusqlite::params![slug, token, created_at_str, expires_ms],
            )?;
            AliasWrite::Created
          }
          Some((held, _)) if held == token => {
            conn.execute(
              "UPDATE aliases SET expires_at = MAX(expires_at, ?2) WHERE slug = ?1",
              rusqlite::params![slug, expires_ms],
            )?;
            AliasWrite::Refreshed
          }
          Some((_, held_expiry)) if held_expiry <= now_ms => {
            conn.execute(
              "UPDATE aliases SET token = ?2, created_at = ?3, expires_at = ?4
               WHERE slug = ?1",
              rusqlite::params![slug, token, created_at_str, expires_ms],
            )?;
            AliasWrite::Created
          }
          Some(_) => AliasWrite::Taken,
        };
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }

  async fn get_alias<'a>(
    &'a self,
    slug: &'a str,
    now: DateTime<Utc>,
  ) -> Result<Option<Alias>> {
    let slug = slug.to_owned();
    let now_ms = encode_ms(now);

    let raw: Option<RawAlias> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT slug, token, created_at, expires_at FROM aliases
               WHERE slug = ?1 AND expires_at > ?2",
              rusqlite::params![slug, now_ms],
              |row| {
                Ok(RawAlias {
                  slug:       row.get(0)?,
                  token:      row.get(1)?,
                  created_at: row.get(2)?,
                  expires_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAlias::into_alias).transpose()
  }

  // ── Exchange mailbox ──────────────────────────────────────────────────────

  async fn enqueue_exchange(&self, new: NewExchange) -> Result<ExchangeRecord> {
    let record = ExchangeRecord {
      id:                   Uuid::new_v4(),
      initiator_profile_id: new.initiator_profile_id,
      target_profile_id:    new.target_profile_id,
      payload:              new.payload,
      status:               ExchangeStatus::Pending,
      created_at:           Utc::now().trunc_subsecs(3),
      consumed_at:          None,
    };

    let id_str        = encode_uuid(record.id);
    let initiator     = record.initiator_profile_id.clone();
    let target        = record.target_profile_id.clone();
    let payload_json  = encode_payload(&record.payload)?;
    let status        = encode_status(record.status);
    let created_at_ms = encode_ms(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO exchanges (
             exchange_id, initiator_profile_id, target_profile_id,
             payload_json, status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            initiator,
            target,
            payload_json,
            status,
            created_at_ms,
          ],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(
      exchange = %record.id,
      profile = %record.target_profile_id,
      "exchange queued"
    );
    Ok(record)
  }

  async fn drain_exchanges<'a>(
    &'a self,
    target_id: &'a str,
    limit: usize,
  ) -> Result<Vec<ExchangeRecord>> {
    if limit == 0 {
      return Ok(Vec::new());
    }

    let target = target_id.to_owned();
    let now_ms = encode_ms(Utc::now());

    // Rows are decoded before they are marked, inside one write transaction,
    // so a row that cannot be read stays pending and costs no other record.
    let (records, skipped) = self
      .conn
      .call(move |conn| {
        let tx = conn
          .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut claimed: Vec<(i64, ExchangeRecord)> = Vec::new();
        let mut skipped: Vec<(i64, String)> = Vec::new();
        {
          let mut stmt = tx.prepare(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM exchanges
             WHERE target_profile_id = ?1 AND status = 'pending'
             ORDER BY created_at ASC, seq ASC"
          ))?;
          let mut rows = stmt.query(rusqlite::params![target])?;
          while claimed.len() < limit {
            let Some(row) = rows.next()? else { break };
            let raw = raw_exchange(row)?;
            let seq = raw.seq;
            match raw.into_record() {
              Ok(record) => claimed.push((seq, record)),
              Err(e) => skipped.push((seq, e.to_string())),
            }
          }
        }
        {
          let mut mark = tx.prepare(
            "UPDATE exchanges SET status = 'delivered', consumed_at = ?1
             WHERE seq = ?2 AND status = 'pending'",
          )?;
          for (seq, _) in &claimed {
            mark.execute(rusqlite::params![now_ms, seq])?;
          }
        }
        tx.commit()?;
        Ok((claimed, skipped))
      })
      .await?;

    for (seq, error) in &skipped {
      tracing::warn!(profile = %target_id, seq, %error, "undecodable exchange left pending");
    }

    let consumed_at = decode_ms(now_ms)?;
    let records: Vec<ExchangeRecord> = records
      .into_iter()
      .map(|(_, mut record)| {
        record.status = ExchangeStatus::Delivered;
        record.consumed_at = Some(consumed_at);
        record
      })
      .collect();

    if !records.is_empty() {
      tracing::debug!(profile = %target_id, count = records.len(), "exchanges drained");
    }
    Ok(records)
  }
}
