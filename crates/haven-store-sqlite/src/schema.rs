//! SQL schema for the SQLite accommodation store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS premises (
    premises_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL,              -- 'online' | 'archived'
    start_date  TEXT NOT NULL,              -- YYYY-MM-DD
    end_date    TEXT,
    version     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bedspaces (
    bedspace_id TEXT PRIMARY KEY,
    premises_id TEXT NOT NULL REFERENCES premises(premises_id),
    reference   TEXT NOT NULL,
    start_date  TEXT NOT NULL,
    end_date    TEXT,
    version     INTEGER NOT NULL DEFAULT 0
);

-- Owned by the booking side; the lifecycle engine only reads these.
CREATE TABLE IF NOT EXISTS bookings (
    booking_id              TEXT PRIMARY KEY,
    bedspace_id             TEXT NOT NULL REFERENCES bedspaces(bedspace_id),
    premises_id             TEXT NOT NULL REFERENCES premises(premises_id),
    arrival_date            TEXT NOT NULL,
    departure_date          TEXT NOT NULL,
    status                  TEXT NOT NULL,
    turnaround_working_days INTEGER
);

CREATE TABLE IF NOT EXISTS void_periods (
    void_id      TEXT PRIMARY KEY,
    bedspace_id  TEXT NOT NULL REFERENCES bedspaces(bedspace_id),
    premises_id  TEXT NOT NULL REFERENCES premises(premises_id),
    start_date   TEXT NOT NULL,
    end_date     TEXT NOT NULL,
    reason       TEXT NOT NULL,
    cancelled_at TEXT
);

-- Append-only apart from cancelled_at. seq preserves recording order.
CREATE TABLE IF NOT EXISTS lifecycle_events (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id       TEXT NOT NULL UNIQUE,
    event_type     TEXT NOT NULL,           -- discriminant of EventDetails
    entity_id      TEXT NOT NULL,
    premises_id    TEXT NOT NULL,
    transaction_id TEXT NOT NULL,
    user_id        TEXT,
    occurred_at    TEXT NOT NULL,           -- RFC 3339, fixed width
    details_json   TEXT NOT NULL,           -- JSON payload (inner data only)
    cancelled_at   TEXT
);

CREATE INDEX IF NOT EXISTS bedspaces_premises_idx ON bedspaces(premises_id);
CREATE INDEX IF NOT EXISTS bookings_bedspace_idx  ON bookings(bedspace_id);
CREATE INDEX IF NOT EXISTS bookings_premises_idx  ON bookings(premises_id);
CREATE INDEX IF NOT EXISTS voids_bedspace_idx     ON void_periods(bedspace_id);
CREATE INDEX IF NOT EXISTS voids_premises_idx     ON void_periods(premises_id);
CREATE INDEX IF NOT EXISTS events_entity_idx      ON lifecycle_events(entity_id, event_type);
CREATE INDEX IF NOT EXISTS events_tx_idx          ON lifecycle_events(transaction_id);

PRAGMA user_version = 1;
";
