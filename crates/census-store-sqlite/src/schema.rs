//! SQL schema for the Census SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision; future migrations will be gated on that number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One mutable row per person: a cache of the latest event's state_after.
-- Rows are never deleted; soft deletion sets `deleted = 1`.
CREATE TABLE IF NOT EXISTS persons (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT    NOT NULL,
    national_id TEXT    NOT NULL,
    birth_date  TEXT    NOT NULL,   -- ISO 8601 calendar date
    version     INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
    deleted     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT    NOT NULL,   -- RFC 3339 UTC, microseconds
    updated_at  TEXT    NOT NULL
);

-- Hard backing invariant for national-id uniqueness among active persons.
CREATE UNIQUE INDEX IF NOT EXISTS persons_national_id_active
    ON persons(national_id) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS persons_updated_idx ON persons(updated_at);

-- Strictly append-only; the triggers below reject UPDATE and DELETE.
CREATE TABLE IF NOT EXISTS person_events (
    event_id     TEXT    PRIMARY KEY,
    person_id    INTEGER NOT NULL REFERENCES persons(id),
    base_version INTEGER NOT NULL,
    new_version  INTEGER NOT NULL,
    changes      TEXT    NOT NULL,   -- JSON object, present keys only
    state_after  TEXT    NOT NULL,   -- JSON snapshot
    format       INTEGER NOT NULL,   -- key-set version of changes/state_after
    created_at   TEXT    NOT NULL,
    UNIQUE (person_id, new_version),
    CHECK  (new_version = base_version + 1)
);

CREATE TRIGGER IF NOT EXISTS person_events_no_update
BEFORE UPDATE ON person_events
BEGIN
    SELECT RAISE(ABORT, 'person_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS person_events_no_delete
BEFORE DELETE ON person_events
BEGIN
    SELECT RAISE(ABORT, 'person_events is append-only');
END;

PRAGMA user_version = 1;
";
