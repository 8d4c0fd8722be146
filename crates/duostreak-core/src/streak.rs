//! The streak transition rule.
//!
//! Called on every tick for every active duo, so it must be idempotent within
//! a day: once a day is recorded as completed, further ticks on the same day
//! never move the counters again.

use serde::{Deserialize, Serialize};

use crate::day::DayKey;

/// Persisted streak counters for one duo.
///
/// Invariant: `longest >= current`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
  /// Consecutive completed days ending at `last_completed`.
  pub current:        u32,
  /// Historical maximum of `current`.
  pub longest:        u32,
  /// `None` until the duo completes its first day.
  pub last_completed: Option<DayKey>,
}

/// Result of applying [`transition`] to one day's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakTransition {
  /// True only on the tick that first crosses the threshold for the day.
  pub completed_now: bool,
  pub current:       u32,
  pub longest:       u32,
}

impl StreakTransition {
  /// The state to persist, if this transition completed `today`.
  pub fn completed_state(&self, today: DayKey) -> Option<StreakState> {
    self.completed_now.then_some(StreakState {
      current:        self.current,
      longest:        self.longest,
      last_completed: Some(today),
    })
  }
}

/// Decide whether `today_seconds` completes `today`, and how the counters
/// move if it does.
///
/// - Below the threshold, or already completed today: nothing changes.
/// - Completed yesterday: the streak continues.
/// - Any older completion, or none at all: the streak restarts at one.
pub fn transition(
  min_required_seconds: i64,
  today_seconds: i64,
  today: DayKey,
  prior: &StreakState,
) -> StreakTransition {
  let unchanged = StreakTransition {
    completed_now: false,
    current:       prior.current,
    longest:       prior.longest,
  };

  if today_seconds < min_required_seconds {
    return unchanged;
  }
  if prior.last_completed == Some(today) {
    return unchanged;
  }

  let current = if prior.last_completed == Some(today.prev()) {
    if prior.current > 0 { prior.current + 1 } else { 1 }
  } else {
    1
  };

  StreakTransition {
    completed_now: true,
    current,
    longest: prior.longest.max(current),
  }
}
