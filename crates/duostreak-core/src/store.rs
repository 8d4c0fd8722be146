//! The `StreakStore` trait: durable duo, daily-overlap and streak counters.
//!
//! Every operation is scoped to a guild; each guild is its own storage
//! partition. Implementations must serialise writes within a guild so that
//! "add seconds, read the new total" is atomic.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};

use crate::{
  day::DayKey,
  duo::{DuoId, DuoPair, GuildId, StorageCounts, TickOutcome},
  streak::StreakState,
};

/// Abstraction over a streak store backend.
///
/// All methods return `Send` futures so the store can be shared between the
/// tick loop and request handlers on a multi-threaded runtime.
pub trait StreakStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Duos ──────────────────────────────────────────────────────────────

  /// Look up the duo for `pair`, creating it on first use.
  fn get_or_create_duo(
    &self,
    guild: GuildId,
    pair: DuoPair,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<DuoId, Self::Error>> + Send + '_;

  /// Look up the duo for `pair` without creating it.
  fn find_duo(
    &self,
    guild: GuildId,
    pair: DuoPair,
  ) -> impl Future<Output = Result<Option<DuoId>, Self::Error>> + Send + '_;

  /// The two users behind a duo id.
  fn duo_members(
    &self,
    guild: GuildId,
    duo: DuoId,
  ) -> impl Future<Output = Result<Option<DuoPair>, Self::Error>> + Send + '_;

  // ── Daily overlap ─────────────────────────────────────────────────────

  /// Add `seconds` to the duo's bucket for `day` and return the new total.
  fn add_daily_seconds(
    &self,
    guild: GuildId,
    duo: DuoId,
    day: DayKey,
    seconds: i64,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// The duo's total for `day`; zero if nothing was recorded.
  fn daily_seconds(
    &self,
    guild: GuildId,
    duo: DuoId,
    day: DayKey,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Per-day totals for `first..=last`. Days without a row are absent.
  fn day_map(
    &self,
    guild: GuildId,
    duo: DuoId,
    first: DayKey,
    last: DayKey,
  ) -> impl Future<Output = Result<BTreeMap<DayKey, i64>, Self::Error>> + Send + '_;

  /// Sum of every overlap second ever recorded for the duo.
  fn connection_score(
    &self,
    guild: GuildId,
    duo: DuoId,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  // ── Streaks ───────────────────────────────────────────────────────────

  /// The duo's streak counters; the default state if none were saved.
  fn get_streak(
    &self,
    guild: GuildId,
    duo: DuoId,
  ) -> impl Future<Output = Result<StreakState, Self::Error>> + Send + '_;

  /// Upsert the duo's streak counters.
  fn save_streak(
    &self,
    guild: GuildId,
    duo: DuoId,
    state: StreakState,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Tick attribution ──────────────────────────────────────────────────

  /// Credit one tick to `pair` on `day` and apply the streak rule, all as
  /// one atomic unit: either the seconds and any resulting streak change are
  /// both durable, or neither is.
  fn record_tick(
    &self,
    guild: GuildId,
    pair: DuoPair,
    day: DayKey,
    seconds: i64,
    min_required_seconds: i64,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<TickOutcome, Self::Error>> + Send + '_;

  /// Re-run the streak rule for every duo with a row on `day`. Returns how
  /// many duos completed as a result.
  fn recalc_day(
    &self,
    guild: GuildId,
    day: DayKey,
    min_required_seconds: i64,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Config overrides ──────────────────────────────────────────────────

  /// Raw `(key, value)` override rows for the guild.
  fn config_overrides(
    &self,
    guild: GuildId,
  ) -> impl Future<Output = Result<Vec<(String, String)>, Self::Error>> + Send + '_;

  fn set_config_override(
    &self,
    guild: GuildId,
    key: String,
    value: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove an override. Returns whether one existed.
  fn clear_config_override(
    &self,
    guild: GuildId,
    key: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Diagnostics ───────────────────────────────────────────────────────

  fn counts(
    &self,
    guild: GuildId,
  ) -> impl Future<Output = Result<StorageCounts, Self::Error>> + Send + '_;

  /// Delete every duo, daily total and streak in the guild in one atomic
  /// step. Config overrides are kept. Returns what was removed.
  fn reset_guild(
    &self,
    guild: GuildId,
  ) -> impl Future<Output = Result<StorageCounts, Self::Error>> + Send + '_;
}
