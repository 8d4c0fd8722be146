//! [`SqliteStore`]: one guild's streak database.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use duostreak_core::{
  day::DayKey,
  duo::{DuoId, DuoPair, StorageCounts, TickOutcome},
  streak::{StreakState, transition},
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  Result,
  encode::{RawStreak, encode_last_completed, encode_ts},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The streak database of a single guild, backed by one SQLite file.
///
/// All calls go through one connection thread, which serialises every write
/// to the guild. Cloning is cheap; the inner connection is reference-counted.
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

  /// Close the underlying connection, waiting for queued calls to finish.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  // ── Duos ──────────────────────────────────────────────────────────────────

  pub async fn get_or_create_duo(&self, pair: DuoPair, now: DateTime<Utc>) -> Result<DuoId> {
    let now = encode_ts(now);
    let id = self.conn.call(move |conn| Ok(upsert_duo(conn, pair, now)?)).await?;
    Ok(id)
  }

  pub async fn find_duo(&self, pair: DuoPair) -> Result<Option<DuoId>> {
    let id = self.conn.call(move |conn| Ok(select_duo(conn, pair)?)).await?;
    Ok(id)
  }

  pub async fn duo_members(&self, duo: DuoId) -> Result<Option<DuoPair>> {
    let raw: Option<(u64, u64)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_low, user_high FROM duos WHERE duo_id = ?1",
              rusqlite::params![duo],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(|(a, b)| DuoPair::new(a, b)).transpose()?)
  }

  // ── Daily overlap ─────────────────────────────────────────────────────────

  pub async fn add_daily_seconds(
    &self,
    duo: DuoId,
    day: DayKey,
    seconds: i64,
    now: DateTime<Utc>,
  ) -> Result<i64> {
    let now = encode_ts(now);
    let total = self
      .conn
      .call(move |conn| Ok(add_daily(conn, duo, day, seconds, now)?))
      .await?;
    Ok(total)
  }

  pub async fn daily_seconds(&self, duo: DuoId, day: DayKey) -> Result<i64> {
    let total = self.conn.call(move |conn| Ok(select_daily(conn, duo, day)?)).await?;
    Ok(total)
  }

  pub async fn day_map(
    &self,
    duo: DuoId,
    first: DayKey,
    last: DayKey,
  ) -> Result<BTreeMap<DayKey, i64>> {
    let rows: Vec<(i64, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT day_key, overlap_seconds
           FROM duo_daily
           WHERE duo_id = ?1 AND day_key BETWEEN ?2 AND ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![duo, first.0, last.0], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows.into_iter().map(|(day, secs)| (DayKey(day), secs)).collect())
  }

  pub async fn connection_score(&self, duo: DuoId) -> Result<i64> {
    let score = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COALESCE(SUM(overlap_seconds), 0) FROM duo_daily WHERE duo_id = ?1",
          rusqlite::params![duo],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(score)
  }

  // ── Streaks ───────────────────────────────────────────────────────────────

  pub async fn get_streak(&self, duo: DuoId) -> Result<StreakState> {
    let state = self.conn.call(move |conn| Ok(select_streak(conn, duo)?)).await?;
    Ok(state)
  }

  pub async fn save_streak(&self, duo: DuoId, state: StreakState, now: DateTime<Utc>) -> Result<()> {
    let now = encode_ts(now);
    self
      .conn
      .call(move |conn| {
        upsert_streak(conn, duo, &state, now)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Tick attribution ──────────────────────────────────────────────────────

  /// Create the duo if needed, add `seconds` to its day, and apply the
  /// streak rule, all inside one transaction.
  pub async fn record_tick(
    &self,
    pair: DuoPair,
    day: DayKey,
    seconds: i64,
    min_required_seconds: i64,
    now: DateTime<Utc>,
  ) -> Result<TickOutcome> {
    let now = encode_ts(now);
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let duo_id = upsert_duo(&tx, pair, now)?;
        let today_seconds = add_daily(&tx, duo_id, day, seconds, now)?;
        let prior = select_streak(&tx, duo_id)?;

        let step = transition(min_required_seconds, today_seconds, day, &prior);
        let streak = match step.completed_state(day) {
          Some(next) => {
            upsert_streak(&tx, duo_id, &next, now)?;
            next
          }
          None => prior,
        };

        tx.commit()?;
        Ok(TickOutcome { duo_id, today_seconds, completed_now: step.completed_now, streak })
      })
      .await?;
    Ok(outcome)
  }

  /// Re-run the streak rule for every duo with a row on `day`.
  pub async fn recalc_day(
    &self,
    day: DayKey,
    min_required_seconds: i64,
    now: DateTime<Utc>,
  ) -> Result<usize> {
    let now = encode_ts(now);
    let completed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let rows: Vec<(DuoId, i64)> = {
          let mut stmt =
            tx.prepare("SELECT duo_id, overlap_seconds FROM duo_daily WHERE day_key = ?1")?;
          stmt
            .query_map(rusqlite::params![day.0], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut completed = 0;
        for (duo_id, today_seconds) in rows {
          let prior = select_streak(&tx, duo_id)?;
          let step = transition(min_required_seconds, today_seconds, day, &prior);
          if let Some(next) = step.completed_state(day) {
            upsert_streak(&tx, duo_id, &next, now)?;
            completed += 1;
          }
        }

        tx.commit()?;
        Ok(completed)
      })
      .await?;
    Ok(completed)
  }

  // ── Config overrides ──────────────────────────────────────────────────────

  pub async fn config_overrides(&self) -> Result<Vec<(String, String)>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT key, value FROM guild_settings ORDER BY key")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  pub async fn set_config_override(
    &self,
    key: String,
    value: String,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let now = encode_ts(now);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO guild_settings (key, value, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (key)
           DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
          rusqlite::params![key, value, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn clear_config_override(&self, key: String) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM guild_settings WHERE key = ?1", rusqlite::params![key])?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── Diagnostics ───────────────────────────────────────────────────────────

  pub async fn counts(&self) -> Result<StorageCounts> {
    let counts = self.conn.call(|conn| Ok(select_counts(conn)?)).await?;
    Ok(counts)
  }

  // ── Reset ─────────────────────────────────────────────────────────────────

  /// Wipe every duo, daily total and streak; config overrides survive.
  /// Returns the counts that were removed.
  pub async fn reset(&self) -> Result<StorageCounts> {
    let removed = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let removed = select_counts(&tx)?;
        tx.execute("DELETE FROM duo_daily", [])?;
        tx.execute("DELETE FROM duo_streaks", [])?;
        tx.execute("DELETE FROM duos", [])?;
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed)
  }
}

// ─── Statement helpers ───────────────────────────────────────────────────────
//
// Shared by the single-statement methods and the transactional ones; a
// `Transaction` derefs to `Connection`.

fn select_counts(conn: &Connection) -> rusqlite::Result<StorageCounts> {
  conn.query_row(
    "SELECT
       (SELECT COUNT(*) FROM duos),
       (SELECT COUNT(*) FROM duo_daily),
       (SELECT COUNT(*) FROM duo_streaks)",
    [],
    |row| {
      Ok(StorageCounts {
        duos:        row.get(0)?,
        daily_rows:  row.get(1)?,
        streak_rows: row.get(2)?,
      })
    },
  )
}

fn select_duo(conn: &Connection, pair: DuoPair) -> rusqlite::Result<Option<DuoId>> {
  conn
    .query_row(
      "SELECT duo_id FROM duos WHERE user_low = ?1 AND user_high = ?2",
      rusqlite::params![pair.low(), pair.high()],
      |row| row.get(0),
    )
    .optional()
}

fn upsert_duo(conn: &Connection, pair: DuoPair, now: i64) -> rusqlite::Result<DuoId> {
  conn.execute(
    "INSERT OR IGNORE INTO duos (user_low, user_high, created_at) VALUES (?1, ?2, ?3)",
    rusqlite::params![pair.low(), pair.high(), now],
  )?;
  conn.query_row(
    "SELECT duo_id FROM duos WHERE user_low = ?1 AND user_high = ?2",
    rusqlite::params![pair.low(), pair.high()],
    |row| row.get(0),
  )
}

fn add_daily(
  conn: &Connection,
  duo: DuoId,
  day: DayKey,
  seconds: i64,
  now: i64,
) -> rusqlite::Result<i64> {
  conn.query_row(
    "INSERT INTO duo_daily (duo_id, day_key, overlap_seconds, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (duo_id, day_key)
     DO UPDATE SET
       overlap_seconds = overlap_seconds + excluded.overlap_seconds,
       updated_at      = excluded.updated_at
     RETURNING overlap_seconds",
    rusqlite::params![duo, day.0, seconds, now],
    |row| row.get(0),
  )
}

fn select_daily(conn: &Connection, duo: DuoId, day: DayKey) -> rusqlite::Result<i64> {
  Ok(
    conn
      .query_row(
        "SELECT overlap_seconds FROM duo_daily WHERE duo_id = ?1 AND day_key = ?2",
        rusqlite::params![duo, day.0],
        |row| row.get(0),
      )
      .optional()?
      .unwrap_or(0),
  )
}

fn select_streak(conn: &Connection, duo: DuoId) -> rusqlite::Result<StreakState> {
  let raw = conn
    .query_row(
      "SELECT current_streak, longest_streak, last_completed_day_key
       FROM duo_streaks
       WHERE duo_id = ?1",
      rusqlite::params![duo],
      |row| {
        Ok(RawStreak {
          current:        row.get(0)?,
          longest:        row.get(1)?,
          last_completed: row.get(2)?,
        })
      },
    )
    .optional()?;
  Ok(raw.map(RawStreak::into_state).unwrap_or_default())
}

fn upsert_streak(
  conn: &Connection,
  duo: DuoId,
  state: &StreakState,
  now: i64,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO duo_streaks (
       duo_id, current_streak, longest_streak, last_completed_day_key, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (duo_id)
     DO UPDATE SET
       current_streak         = excluded.current_streak,
       longest_streak         = excluded.longest_streak,
       last_completed_day_key = excluded.last_completed_day_key,
       updated_at             = excluded.updated_at",
    rusqlite::params![
      duo,
      state.current,
      state.longest,
      encode_last_completed(state.last_completed),
      now,
    ],
  )?;
  Ok(())
}
