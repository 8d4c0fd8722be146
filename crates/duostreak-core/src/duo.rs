//! Duos: the unordered pair of users tracked as one co-presence unit.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, day::DayKey, streak::StreakState};

/// Community (server) identifier; one storage partition per guild.
pub type GuildId = u64;
/// Voice channel identifier.
pub type ChannelId = u64;
/// User identifier.
pub type UserId = u64;
/// Surrogate id assigned to a duo by the store, unique within a guild.
pub type DuoId = i64;

// ─── DuoPair ─────────────────────────────────────────────────────────────────

/// Two distinct users, canonicalised so that `(a, b)` and `(b, a)` are equal.
///
/// The smaller id is always `low`. Construction fails for a self-pair.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "(UserId, UserId)", into = "(UserId, UserId)")]
pub struct DuoPair {
  low:  UserId,
  high: UserId,
}

impl DuoPair {
  pub fn new(a: UserId, b: UserId) -> Result<Self> {
    match a.cmp(&b) {
      std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
      std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
      std::cmp::Ordering::Equal => Err(Error::InvalidDuo(a)),
    }
  }

  pub fn low(&self) -> UserId { self.low }

  pub fn high(&self) -> UserId { self.high }

  pub fn contains(&self, user: UserId) -> bool { self.low == user || self.high == user }

  pub fn members(&self) -> [UserId; 2] { [self.low, self.high] }
}

impl TryFrom<(UserId, UserId)> for DuoPair {
  type Error = Error;

  fn try_from((a, b): (UserId, UserId)) -> Result<Self> { Self::new(a, b) }
}

impl From<DuoPair> for (UserId, UserId) {
  fn from(pair: DuoPair) -> Self { (pair.low, pair.high) }
}

impl std::fmt::Display for DuoPair {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}+{}", self.low, self.high)
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Accumulated overlap for one duo on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOverlap {
  pub duo_id:          DuoId,
  pub day:             DayKey,
  pub overlap_seconds: i64,
}

/// What one tick attribution did to a duo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutcome {
  pub duo_id:         DuoId,
  /// Today's total after adding this tick's seconds.
  pub today_seconds:  i64,
  /// Whether this tick pushed the day over the threshold.
  pub completed_now:  bool,
  /// Streak state after the tick (unchanged unless `completed_now`).
  pub streak:         StreakState,
}

impl TickOutcome {
  /// A duo "qualifies" once it has met today's threshold or carries a live
  /// streak.
  pub fn qualifies(&self, min_required_seconds: i64) -> bool {
    self.today_seconds >= min_required_seconds || self.streak.current > 0
  }
}

/// Everything a caller needs to describe a duo's standing today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuoStatus {
  pub pair:                 DuoPair,
  pub duo_id:               DuoId,
  pub day:                  DayKey,
  pub today_seconds:        i64,
  pub min_required_seconds: i64,
  pub completed_today:      bool,
  pub streak:               StreakState,
  /// Sum of every overlap second ever recorded for the duo.
  pub connection_score:     i64,
}

/// Row counts for one guild's store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCounts {
  pub duos:        u64,
  pub daily_rows:  u64,
  pub streak_rows: u64,
}
