//! SQL schema for the waiver SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Waivers are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table; the triggers below
-- turn an accidental one into an error.
CREATE TABLE IF NOT EXISTS waivers (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    subject         TEXT NOT NULL,      -- canonical JSON, keys sorted
    testcase        TEXT NOT NULL,
    product_version TEXT NOT NULL,
    username        TEXT NOT NULL,
    proxied_by      TEXT,
    waived          INTEGER NOT NULL,   -- 0 | 1
    comment         TEXT,
    timestamp       TEXT NOT NULL       -- RFC 3339 UTC, fixed width; server-assigned
);

CREATE TRIGGER IF NOT EXISTS waivers_no_update
BEFORE UPDATE ON waivers
BEGIN
    SELECT RAISE(ABORT, 'waivers are append-only');
END;

CREATE TRIGGER IF NOT EXISTS waivers_no_delete
BEFORE DELETE ON waivers
BEGIN
    SELECT RAISE(ABORT, 'waivers are append-only');
END;

-- Supersession key lookups (current waiver = MAX(id) per key).
CREATE INDEX IF NOT EXISTS waivers_key_idx
    ON waivers(subject, testcase, username, product_version, id);
CREATE INDEX IF NOT EXISTS waivers_testcase_idx  ON waivers(testcase);
CREATE INDEX IF NOT EXISTS waivers_timestamp_idx ON waivers(timestamp);

PRAGMA user_version = 1;
";
