//! SQL schema for the Rapport SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- slug -> token. Slugs are derived from the token digest, so the same token
-- always lands on the same row.
CREATE TABLE IF NOT EXISTS aliases (
    slug        TEXT PRIMARY KEY,
    token       TEXT NOT NULL,
    created_at  TEXT NOT NULL,      -- ISO 8601 UTC
    expires_at  INTEGER NOT NULL    -- epoch milliseconds
);

-- The reciprocal-exchange mailbox. `seq` breaks ties between records created
-- in the same millisecond so delivery order matches enqueue order.
CREATE TABLE IF NOT EXISTS exchanges (
    seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange_id          TEXT NOT NULL UNIQUE,
    initiator_profile_id TEXT NOT NULL,
    target_profile_id    TEXT NOT NULL,
    payload_json         TEXT NOT NULL,
    status               TEXT NOT NULL DEFAULT 'pending',
    created_at           INTEGER NOT NULL,   -- epoch milliseconds
    consumed_at          INTEGER,            -- NULL until delivered
    CHECK (initiator_profile_id != target_profile_id),
    CHECK (status IN ('pending', 'delivered')),
    CHECK ((status = 'pending') = (consumed_at IS NULL))
);

CREATE INDEX IF NOT EXISTS exchanges_pending_idx
    ON exchanges(target_profile_id, status, created_at, seq);
CREATE INDEX IF NOT EXISTS aliases_expiry_idx ON aliases(expires_at);

PRAGMA user_version = 1;
";
