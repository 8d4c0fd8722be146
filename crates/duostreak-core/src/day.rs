//! Day keys: the time bucket for daily totals and streak comparisons.
//!
//! A day key is the proleptic Gregorian ordinal of a local calendar date
//! (0001-01-01 is day 1), after shifting the local wall clock back by a grace
//! offset. With a grace of three hours, 02:59 local still counts toward the
//! previous day.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Integer encoding of a local calendar day. Consecutive days differ by one.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DayKey(pub i64);

impl DayKey {
  pub fn from_date(date: NaiveDate) -> Self { Self(i64::from(date.num_days_from_ce())) }

  /// The calendar date this key encodes, if it is in chrono's range.
  pub fn date(self) -> Option<NaiveDate> {
    i32::try_from(self.0)
      .ok()
      .and_then(NaiveDate::from_num_days_from_ce_opt)
  }

  pub fn prev(self) -> Self { Self(self.0 - 1) }

  pub fn next(self) -> Self { Self(self.0 + 1) }

  /// The key `days` days after (or before, when negative) this one.
  pub fn offset(self, days: i64) -> Self { Self(self.0 + days) }
}

impl fmt::Display for DayKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.date() {
      Some(date) => write!(f, "{} ({date})", self.0),
      None => write!(f, "{}", self.0),
    }
  }
}

/// Compute the day key for `instant` as seen in `tz`, with the day boundary
/// moved `grace_hours` past local midnight.
///
/// The timezone conversion goes through the IANA database, so DST
/// transitions shift the boundary with the local clock rather than with a
/// fixed offset.
pub fn day_key(instant: DateTime<Utc>, tz: Tz, grace_hours: u32) -> DayKey {
  let local = instant.with_timezone(&tz).naive_local();
  let shifted = local - TimeDelta::hours(i64::from(grace_hours));
  DayKey::from_date(shifted.date())
}
