//! Conversions between domain types and the integer columns they live in.
//!
//! Timestamps are unix seconds. A missing last-completed day is stored as
//! `-1` so the column can stay `NOT NULL`.

use chrono::{DateTime, Utc};
use duostreak_core::{day::DayKey, streak::StreakState};

pub const NEVER_COMPLETED: i64 = -1;

pub fn encode_ts(dt: DateTime<Utc>) -> i64 { dt.timestamp() }

pub fn encode_last_completed(day: Option<DayKey>) -> i64 {
  day.map_or(NEVER_COMPLETED, |d| d.0)
}

pub fn decode_last_completed(raw: i64) -> Option<DayKey> {
  (raw > NEVER_COMPLETED).then_some(DayKey(raw))
}

/// Raw values read directly from a `duo_streaks` row.
pub struct RawStreak {
  pub current:        u32,
  pub longest:        u32,
  pub last_completed: i64,
}

impl RawStreak {
  pub fn into_state(self) -> StreakState {
    StreakState {
      current:        self.current,
      longest:        self.longest,
      last_completed: decode_last_completed(self.last_completed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sentinel_maps_to_none() {
    assert_eq!(decode_last_completed(NEVER_COMPLETED), None);
    assert_eq!(encode_last_completed(None), NEVER_COMPLETED);
    assert_eq!(decode_last_completed(738_900), Some(DayKey(738_900)));
  }
}
