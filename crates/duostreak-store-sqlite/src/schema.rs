//! SQL schema for a guild's streak database.
//!
//! Each guild gets its own file, so no table carries a guild column.
//! Executed once when the connection opens; future migrations will be gated
//! on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per unordered pair; user_low is always the smaller id.
CREATE TABLE IF NOT EXISTS duos (
    duo_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_low    INTEGER NOT NULL,
    user_high   INTEGER NOT NULL,
    created_at  INTEGER NOT NULL,   -- unix seconds
    UNIQUE (user_low, user_high),
    CHECK  (user_low < user_high)
);

-- Overlap seconds per duo per day key. Only ever incremented.
CREATE TABLE IF NOT EXISTS duo_daily (
    duo_id           INTEGER NOT NULL REFERENCES duos(duo_id),
    day_key          INTEGER NOT NULL,
    overlap_seconds  INTEGER NOT NULL DEFAULT 0,
    updated_at       INTEGER NOT NULL,
    PRIMARY KEY (duo_id, day_key),
    CHECK (overlap_seconds >= 0)
);

-- Streak counters; last_completed_day_key is -1 until the first completion.
CREATE TABLE IF NOT EXISTS duo_streaks (
    duo_id                  INTEGER PRIMARY KEY REFERENCES duos(duo_id),
    current_streak          INTEGER NOT NULL DEFAULT 0,
    longest_streak          INTEGER NOT NULL DEFAULT 0,
    last_completed_day_key  INTEGER NOT NULL DEFAULT -1,
    updated_at              INTEGER NOT NULL,
    CHECK (longest_streak >= current_streak)
);

-- Text overrides layered over the global defaults.
CREATE TABLE IF NOT EXISTS guild_settings (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS duo_daily_day_idx ON duo_daily(day_key);

PRAGMA user_version = 1;
";
