//! SQL schema for the fable SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per record. `version` counts every write to the key and backs the
-- conditional-write handshake in fable-core's repository.
CREATE TABLE IF NOT EXISTS records (
    key        TEXT PRIMARY KEY,
    value      BLOB NOT NULL,
    version    INTEGER NOT NULL,
    expires_at INTEGER          -- unix epoch milliseconds; NULL never expires
);

CREATE INDEX IF NOT EXISTS records_expiry_idx ON records(expires_at);

PRAGMA user_version = 1;
";
