//! Typed per-guild configuration.
//!
//! Global defaults are validated once at startup. A guild may store text
//! overrides for a handful of keys; [`GuildConfig::merge`] lays them over the
//! defaults and silently skips anything that does not parse, so a bad row can
//! never fail a tick.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  day::{DayKey, day_key},
  duo::ChannelId,
};

// ─── Effective config ────────────────────────────────────────────────────────

/// The settings the tick engine reads for one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
  /// IANA zone the guild's day boundary follows.
  pub timezone:                  Tz,
  /// Hours past local midnight at which a new day starts.
  pub grace_hour:                u32,
  /// Overlap needed for a day to count toward the streak.
  pub min_overlap_seconds:       u32,
  /// Seconds credited to a duo per tick.
  pub tick_seconds:              u32,
  /// How long a disconnected user still counts as present.
  pub disconnect_buffer_seconds: u32,
}

impl Default for GuildConfig {
  fn default() -> Self {
    Self {
      timezone:                  chrono_tz::America::Los_Angeles,
      grace_hour:                3,
      min_overlap_seconds:       3 * 60,
      tick_seconds:              15,
      disconnect_buffer_seconds: 60,
    }
  }
}

impl GuildConfig {
  /// Reject defaults the tick path cannot work with.
  pub fn validate(&self) -> Result<()> {
    if self.grace_hour > 23 {
      return Err(Error::InvalidConfig {
        key:    ConfigKey::GraceHour.as_str(),
        reason: format!("{} is not an hour of the day", self.grace_hour),
      });
    }
    if self.tick_seconds == 0 {
      return Err(Error::InvalidConfig {
        key:    ConfigKey::TickSeconds.as_str(),
        reason: "must be positive".to_string(),
      });
    }
    if self.min_overlap_seconds == 0 {
      return Err(Error::InvalidConfig {
        key:    ConfigKey::MinOverlapSeconds.as_str(),
        reason: "must be positive".to_string(),
      });
    }
    Ok(())
  }

  /// Lay stored `(key, value)` overrides over `self`.
  ///
  /// Unknown keys and unparseable values are skipped.
  pub fn merge<'a, I>(&self, overrides: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut merged = self.clone();
    for (key, raw) in overrides {
      let Ok(key) = key.parse::<ConfigKey>() else { continue };
      if let Ok(value) = key.parse_value(raw) {
        merged.apply(value);
      }
    }
    merged
  }

  pub fn apply(&mut self, value: ConfigValue) {
    match value {
      ConfigValue::Timezone(tz) => self.timezone = tz,
      ConfigValue::GraceHour(h) => self.grace_hour = h,
      ConfigValue::MinOverlapSeconds(s) => self.min_overlap_seconds = s,
      ConfigValue::TickSeconds(s) => self.tick_seconds = s,
      ConfigValue::DisconnectBufferSeconds(s) => self.disconnect_buffer_seconds = s,
    }
  }

  pub fn day_key(&self, now: DateTime<Utc>) -> DayKey {
    day_key(now, self.timezone, self.grace_hour)
  }

  pub fn min_required_seconds(&self) -> i64 { i64::from(self.min_overlap_seconds) }

  pub fn disconnect_buffer(&self) -> TimeDelta {
    TimeDelta::seconds(i64::from(self.disconnect_buffer_seconds))
  }
}

// ─── Override keys ───────────────────────────────────────────────────────────

/// The keys a guild may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
  Timezone,
  GraceHour,
  MinOverlapSeconds,
  TickSeconds,
  DisconnectBufferSeconds,
}

impl ConfigKey {
  pub const ALL: [ConfigKey; 5] = [
    ConfigKey::Timezone,
    ConfigKey::GraceHour,
    ConfigKey::MinOverlapSeconds,
    ConfigKey::TickSeconds,
    ConfigKey::DisconnectBufferSeconds,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ConfigKey::Timezone => "timezone",
      ConfigKey::GraceHour => "grace_hour",
      ConfigKey::MinOverlapSeconds => "min_overlap_seconds",
      ConfigKey::TickSeconds => "tick_seconds",
      ConfigKey::DisconnectBufferSeconds => "disconnect_buffer_seconds",
    }
  }

  /// Parse and range-check a raw override.
  ///
  /// Durations accept plain seconds or an `s`/`m`/`h` suffix and are
  /// clamped into their allowed range; a grace hour outside `0..=23` is an
  /// error.
  pub fn parse_value(self, raw: &str) -> Result<ConfigValue> {
    let raw = raw.trim();
    match self {
      ConfigKey::Timezone => raw
        .parse::<Tz>()
        .map(ConfigValue::Timezone)
        .map_err(|_| Error::UnknownTimezone(raw.to_string())),
      ConfigKey::GraceHour => {
        let hour: u32 = raw.parse().map_err(|_| self.invalid("not an integer"))?;
        if hour > 23 {
          return Err(self.invalid("must be between 0 and 23"));
        }
        Ok(ConfigValue::GraceHour(hour))
      }
      ConfigKey::MinOverlapSeconds => {
        Ok(ConfigValue::MinOverlapSeconds(self.seconds(raw)?.clamp(30, 6 * 60 * 60)))
      }
      ConfigKey::TickSeconds => Ok(ConfigValue::TickSeconds(self.seconds(raw)?.clamp(5, 120))),
      ConfigKey::DisconnectBufferSeconds => {
        Ok(ConfigValue::DisconnectBufferSeconds(self.seconds(raw)?.clamp(0, 60 * 60)))
      }
    }
  }

  fn seconds(self, raw: &str) -> Result<u32> {
    parse_seconds(raw).ok_or_else(|| self.invalid("expected seconds, e.g. 180, 3m or 1h"))
  }

  fn invalid(self, reason: &str) -> Error {
    Error::InvalidConfig { key: self.as_str(), reason: reason.to_string() }
  }
}

impl FromStr for ConfigKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    ConfigKey::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| Error::UnknownConfigKey(s.to_string()))
  }
}

impl fmt::Display for ConfigKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A parsed, range-checked override value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValue {
  Timezone(Tz),
  GraceHour(u32),
  MinOverlapSeconds(u32),
  TickSeconds(u32),
  DisconnectBufferSeconds(u32),
}

impl ConfigValue {
  pub fn key(&self) -> ConfigKey {
    match self {
      ConfigValue::Timezone(_) => ConfigKey::Timezone,
      ConfigValue::GraceHour(_) => ConfigKey::GraceHour,
      ConfigValue::MinOverlapSeconds(_) => ConfigKey::MinOverlapSeconds,
      ConfigValue::TickSeconds(_) => ConfigKey::TickSeconds,
      ConfigValue::DisconnectBufferSeconds(_) => ConfigKey::DisconnectBufferSeconds,
    }
  }
}

/// The canonical text form written to the override store.
impl fmt::Display for ConfigValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigValue::Timezone(tz) => f.write_str(tz.name()),
      ConfigValue::GraceHour(n)
      | ConfigValue::MinOverlapSeconds(n)
      | ConfigValue::TickSeconds(n)
      | ConfigValue::DisconnectBufferSeconds(n) => write!(f, "{n}"),
    }
  }
}

fn parse_seconds(raw: &str) -> Option<u32> {
  let raw = raw.to_ascii_lowercase();
  let (digits, unit) = match raw.char_indices().last()? {
    (i, 's') => (&raw[..i], 1),
    (i, 'm') => (&raw[..i], 60),
    (i, 'h') => (&raw[..i], 60 * 60),
    _ => (raw.as_str(), 1),
  };
  digits.trim().parse::<u32>().ok()?.checked_mul(unit)
}

// ─── AFK policy ──────────────────────────────────────────────────────────────

/// Channels whose occupants are never tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfkPolicy {
  pub ignore:   bool,
  pub channels: BTreeSet<ChannelId>,
}

impl AfkPolicy {
  pub fn ignores(&self, channel: ChannelId) -> bool {
    self.ignore && self.channels.contains(&channel)
  }
}
