//! [`GuildStores`]: one [`SqliteStore`] per guild, opened on first use.

use std::{
  collections::{BTreeMap, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use duostreak_core::{
  day::DayKey,
  duo::{DuoId, DuoPair, GuildId, StorageCounts, TickOutcome},
  store::StreakStore,
  streak::StreakState,
};
use tokio::sync::Mutex;

use crate::{Error, Result, SqliteStore};

#[derive(Clone, Debug)]
enum Location {
  Directory(PathBuf),
  InMemory,
}

/// Per-guild SQLite databases, either as `<dir>/<guild>.sqlite3` files or
/// entirely in memory.
///
/// Cloning is cheap; clones share the same open connections.
#[derive(Clone)]
pub struct GuildStores {
  location: Location,
  open:     Arc<Mutex<HashMap<GuildId, SqliteStore>>>,
}

impl GuildStores {
  /// Keep guild databases under `dir`, creating it if needed.
  pub async fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    tokio::fs::create_dir_all(&dir).await?;
    Ok(Self::with_location(Location::Directory(dir)))
  }

  /// Keep every guild database in memory, for tests.
  pub fn in_memory() -> Self { Self::with_location(Location::InMemory) }

  fn with_location(location: Location) -> Self {
    Self { location, open: Arc::new(Mutex::new(HashMap::new())) }
  }

  /// Where a guild's database file lives, if stores are on disk.
  pub fn path_for(&self, guild: GuildId) -> Option<PathBuf> {
    match &self.location {
      Location::Directory(dir) => Some(dir.join(format!("{guild}.sqlite3"))),
      Location::InMemory => None,
    }
  }

  /// The store for `guild`, opening it if this is the first access.
  ///
  /// The map lock is released while the database opens. If two callers race
  /// to open the same guild, the first to finish wins and the other
  /// connection is closed.
  pub async fn guild(&self, guild: GuildId) -> Result<SqliteStore> {
    let cached = self.open.lock().await.get(&guild).cloned();
    if let Some(store) = cached {
      return Ok(store);
    }

    let store = match self.path_for(guild) {
      Some(path) => SqliteStore::open(&path).await?,
      None => SqliteStore::open_in_memory().await?,
    };

    let mut open = self.open.lock().await;
    if let Some(existing) = open.get(&guild).cloned() {
      drop(open);
      if let Err(e) = store.close().await {
        tracing::debug!(guild, error = %e, "closing duplicate guild store failed");
      }
      return Ok(existing);
    }
    open.insert(guild, store.clone());
    tracing::debug!(guild, location = ?self.location, "opened guild store");
    Ok(store)
  }

  /// Close every open guild database. Later calls reopen them.
  pub async fn close_all(&self) -> Result<()> {
    let stores: Vec<SqliteStore> = self.open.lock().await.drain().map(|(_, s)| s).collect();
    let mut first_err = None;
    for store in stores {
      if let Err(e) = store.close().await {
        first_err.get_or_insert(e);
      }
    }
    first_err.map_or(Ok(()), Err)
  }
}

// ─── StreakStore impl ────────────────────────────────────────────────────────

impl StreakStore for GuildStores {
  type Error = Error;

  // ── Duos ──────────────────────────────────────────────────────────────────

  async fn get_or_create_duo(
    &self,
    guild: GuildId,
    pair: DuoPair,
    now: DateTime<Utc>,
  ) -> Result<DuoId> {
    self.guild(guild).await?.get_or_create_duo(pair, now).await
  }

  async fn find_duo(&self, guild: GuildId, pair: DuoPair) -> Result<Option<DuoId>> {
    self.guild(guild).await?.find_duo(pair).await
  }

  async fn duo_members(&self, guild: GuildId, duo: DuoId) -> Result<Option<DuoPair>> {
    self.guild(guild).await?.duo_members(duo).await
  }

  // ── Daily overlap ─────────────────────────────────────────────────────────

  async fn add_daily_seconds(
    &self,
    guild: GuildId,
    duo: DuoId,
    day: DayKey,
    seconds: i64,
    now: DateTime<Utc>,
  ) -> Result<i64> {
    self.guild(guild).await?.add_daily_seconds(duo, day, seconds, now).await
  }

  async fn daily_seconds(&self, guild: GuildId, duo: DuoId, day: DayKey) -> Result<i64> {
    self.guild(guild).await?.daily_seconds(duo, day).await
  }

  async fn day_map(
    &self,
    guild: GuildId,
    duo: DuoId,
    first: DayKey,
    last: DayKey,
  ) -> Result<BTreeMap<DayKey, i64>> {
    self.guild(guild).await?.day_map(duo, first, last).await
  }

  async fn connection_score(&self, guild: GuildId, duo: DuoId) -> Result<i64> {
    self.guild(guild).await?.connection_score(duo).await
  }

  // ── Streaks ───────────────────────────────────────────────────────────────

  async fn get_streak(&self, guild: GuildId, duo: DuoId) -> Result<StreakState> {
    self.guild(guild).await?.get_streak(duo).await
  }

  async fn save_streak(
    &self,
    guild: GuildId,
    duo: DuoId,
    state: StreakState,
    now: DateTime<Utc>,
  ) -> Result<()> {
    self.guild(guild).await?.save_streak(duo, state, now).await
  }

  // ── Tick attribution ──────────────────────────────────────────────────────

  async fn record_tick(
    &self,
    guild: GuildId,
    pair: DuoPair,
    day: DayKey,
    seconds: i64,
    min_required_seconds: i64,
    now: DateTime<Utc>,
  ) -> Result<TickOutcome> {
    self
      .guild(guild)
      .await?
      .record_tick(pair, day, seconds, min_required_seconds, now)
      .await
  }

  async fn recalc_day(
    &self,
    guild: GuildId,
    day: DayKey,
    min_required_seconds: i64,
    now: DateTime<Utc>,
  ) -> Result<usize> {
    self.guild(guild).await?.recalc_day(day, min_required_seconds, now).await
  }

  // ── Config overrides ──────────────────────────────────────────────────────

  async fn config_overrides(&self, guild: GuildId) -> Result<Vec<(String, String)>> {
    self.guild(guild).await?.config_overrides().await
  }

  async fn set_config_override(
    &self,
    guild: GuildId,
    key: String,
    value: String,
    now: DateTime<Utc>,
  ) -> Result<()> {
    self.guild(guild).await?.set_config_override(key, value, now).await
  }

  async fn clear_config_override(&self, guild: GuildId, key: String) -> Result<bool> {
    self.guild(guild).await?.clear_config_override(key).await
  }

  // ── Diagnostics ───────────────────────────────────────────────────────────

  async fn counts(&self, guild: GuildId) -> Result<StorageCounts> {
    self.guild(guild).await?.counts().await
  }

  async fn reset_guild(&self, guild: GuildId) -> Result<StorageCounts> {
    let removed = self.guild(guild).await?.reset().await?;
    tracing::info!(guild, duos = removed.duos, daily_rows = removed.daily_rows, "guild data reset");
    Ok(removed)
  }
}
