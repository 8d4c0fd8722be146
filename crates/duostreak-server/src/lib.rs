//! Server wiring for duostreak: global settings and the HTTP app.

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::Router;
use config::{ConfigError, Environment, File, Source};
use duostreak_core::{
  config::{AfkPolicy, GuildConfig},
  duo::ChannelId,
  store::StreakStore,
};
use duostreak_tracker::Tracker;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Global settings, deserialised from `duostreak.toml` and `DUOSTREAK_*`
/// environment variables. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub timezone:                  String,
  pub grace_hour:                u32,
  pub min_overlap_seconds:       u32,
  pub tick_seconds:              u32,
  pub disconnect_buffer_seconds: u32,
  pub ignore_afk_channels:       bool,
  pub afk_channels:              Vec<ChannelId>,
  pub data_dir:                  PathBuf,
  pub host:                      String,
  pub port:                      u16,
}

impl Default for Settings {
  fn default() -> Self {
    let guild = GuildConfig::default();
    Self {
      timezone:                  guild.timezone.name().to_string(),
      grace_hour:                guild.grace_hour,
      min_overlap_seconds:       guild.min_overlap_seconds,
      tick_seconds:              guild.tick_seconds,
      disconnect_buffer_seconds: guild.disconnect_buffer_seconds,
      ignore_afk_channels:       true,
      afk_channels:              Vec::new(),
      data_dir:                  PathBuf::from("database"),
      host:                      "127.0.0.1".to_string(),
      port:                      8080,
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) layered under `DUOSTREAK_*` variables.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_file(File::from(path).required(false))
  }

  fn from_file<F>(file: F) -> Result<Self, ConfigError>
  where
    F: Source + Send + Sync + 'static,
  {
    config::Config::builder()
      .add_source(file)
      .add_source(
        Environment::with_prefix("DUOSTREAK")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("afk_channels"),
      )
      .build()?
      .try_deserialize()
  }

  /// The validated defaults every guild starts from.
  pub fn guild_defaults(&self) -> duostreak_core::Result<GuildConfig> {
    let timezone = self
      .timezone
      .parse()
      .map_err(|_| duostreak_core::Error::UnknownTimezone(self.timezone.clone()))?;
    let cfg = GuildConfig {
      timezone,
      grace_hour: self.grace_hour,
      min_overlap_seconds: self.min_overlap_seconds,
      tick_seconds: self.tick_seconds,
      disconnect_buffer_seconds: self.disconnect_buffer_seconds,
    };
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn afk_policy(&self) -> AfkPolicy {
    AfkPolicy {
      ignore:   self.ignore_afk_channels,
      channels: self.afk_channels.iter().copied().collect::<BTreeSet<_>>(),
    }
  }

  /// Cadence of the tick loop.
  pub fn tick_period(&self) -> Duration { Duration::from_secs(u64::from(self.tick_seconds)) }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// `data_dir` with a leading `~` expanded to the user's home directory.
  pub fn data_dir(&self) -> PathBuf {
    let s = self.data_dir.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.data_dir.clone()
  }
}

// ─── App ──────────────────────────────────────────────────────────────────────

/// The API router with request tracing.
pub fn app<S>(tracker: Arc<Tracker<S>>) -> Router
where
  S: StreakStore + 'static,
{
  duostreak_api::api_router(tracker).layer(TraceLayer::new_for_http())
}
