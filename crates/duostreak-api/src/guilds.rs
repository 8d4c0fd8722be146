//! Handlers for per-guild read and admin endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/guilds/{guild}/day-key` | Current day under the guild's config |
//! | `GET`    | `/guilds/{guild}/config` | Effective config |
//! | `PUT`    | `/guilds/{guild}/config/{key}` | Body: `{"value":"20m"}` |
//! | `DELETE` | `/guilds/{guild}/config/{key}` | 404 if no override was set |
//! | `POST`   | `/guilds/{guild}/recalc` | Re-run the streak rule for today |
//! | `GET`    | `/guilds/{guild}/counts` | Row counts |
//! | `GET`    | `/guilds/{guild}/qualified` | Users in a qualifying duo as of the last tick |
//! | `DELETE` | `/guilds/{guild}/data` | Requires `?confirm=CONFIRM`; keeps config overrides |

use std::{collections::BTreeSet, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use duostreak_core::{
  config::{ConfigKey, GuildConfig},
  day::DayKey,
  duo::{GuildId, StorageCounts, UserId},
  store::StreakStore,
};
use duostreak_tracker::Tracker;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;

// ─── Day key ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct DayKeyView {
  pub day:        DayKey,
  pub date:       Option<NaiveDate>,
  pub timezone:   String,
  pub grace_hour: u32,
}

/// `GET /guilds/{guild}/day-key`
pub async fn day_key<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(guild): Path<GuildId>,
) -> Result<Json<DayKeyView>, ApiError>
where
  S: StreakStore + 'static,
{
  let cfg = tracker.effective_config(guild).await.map_err(ApiError::store)?;
  let day = cfg.day_key(Utc::now());
  Ok(Json(DayKeyView {
    day,
    date: day.date(),
    timezone: cfg.timezone.name().to_string(),
    grace_hour: cfg.grace_hour,
  }))
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// `GET /guilds/{guild}/config`
pub async fn config<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(guild): Path<GuildId>,
) -> Result<Json<GuildConfig>, ApiError>
where
  S: StreakStore + 'static,
{
  let cfg = tracker.effective_config(guild).await.map_err(ApiError::store)?;
  Ok(Json(cfg))
}

#[derive(Debug, Deserialize)]
pub struct SetBody {
  pub value: String,
}

/// `PUT /guilds/{guild}/config/{key}`: validates and clamps the value before
/// storing it. Responds with the new effective config.
pub async fn set_config<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path((guild, key)): Path<(GuildId, String)>,
  Json(body): Json<SetBody>,
) -> Result<Json<GuildConfig>, ApiError>
where
  S: StreakStore + 'static,
{
  let key: ConfigKey = key.parse()?;
  let value = key.parse_value(&body.value)?;
  let stored = value.to_string();

  tracker
    .store()
    .set_config_override(guild, key.as_str().to_string(), stored.clone(), Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(guild, key = %key, value = %stored, "config override set");

  let cfg = tracker.effective_config(guild).await.map_err(ApiError::store)?;
  Ok(Json(cfg))
}

/// `DELETE /guilds/{guild}/config/{key}`
pub async fn clear_config<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path((guild, key)): Path<(GuildId, String)>,
) -> Result<StatusCode, ApiError>
where
  S: StreakStore + 'static,
{
  let key: ConfigKey = key.parse()?;
  let removed = tracker
    .store()
    .clear_config_override(guild, key.as_str().to_string())
    .await
    .map_err(ApiError::store)?;

  if !removed {
    return Err(ApiError::NotFound(format!("no override for {key} in guild {guild}")));
  }
  info!(guild, key = %key, "config override cleared");
  Ok(StatusCode::NO_CONTENT)
}

// ─── Recalc ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct RecalcView {
  pub day:       DayKey,
  pub completed: usize,
}

/// `POST /guilds/{guild}/recalc`: applies the current threshold to today's
/// totals, e.g. after lowering `min_overlap_seconds`.
pub async fn recalc<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(guild): Path<GuildId>,
) -> Result<Json<RecalcView>, ApiError>
where
  S: StreakStore + 'static,
{
  let now = Utc::now();
  let cfg = tracker.effective_config(guild).await.map_err(ApiError::store)?;
  let day = cfg.day_key(now);
  let completed = tracker
    .store()
    .recalc_day(guild, day, cfg.min_required_seconds(), now)
    .await
    .map_err(ApiError::store)?;

  info!(guild, day = %day, completed, "recalculated day");
  Ok(Json(RecalcView { day, completed }))
}

// ─── Diagnostics ──────────────────────────────────────────────────────────────

/// `GET /guilds/{guild}/counts`
pub async fn counts<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(guild): Path<GuildId>,
) -> Result<Json<StorageCounts>, ApiError>
where
  S: StreakStore + 'static,
{
  let counts = tracker.store().counts(guild).await.map_err(ApiError::store)?;
  Ok(Json(counts))
}

/// `GET /guilds/{guild}/qualified`
pub async fn qualified<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(guild): Path<GuildId>,
) -> Json<BTreeSet<UserId>>
where
  S: StreakStore + 'static,
{
  Json(tracker.qualified().remove(&guild).unwrap_or_default())
}

// ─── Reset ────────────────────────────────────────────────────────────────────

const RESET_CONFIRMATION: &str = "CONFIRM";

#[derive(Debug, Deserialize)]
pub struct ResetParams {
  pub confirm: Option<String>,
}

/// `DELETE /guilds/{guild}/data?confirm=CONFIRM`: wipes every duo, daily
/// total and streak in the guild. Responds with what was removed.
pub async fn reset<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(guild): Path<GuildId>,
  Query(params): Query<ResetParams>,
) -> Result<Json<StorageCounts>, ApiError>
where
  S: StreakStore + 'static,
{
  if params.confirm.as_deref() != Some(RESET_CONFIRMATION) {
    return Err(ApiError::BadRequest(format!(
      "wiping guild {guild} requires ?confirm={RESET_CONFIRMATION}"
    )));
  }

  let removed = tracker.store().reset_guild(guild).await.map_err(ApiError::store)?;
  warn!(guild, duos = removed.duos, daily_rows = removed.daily_rows, "guild data wiped");
  Ok(Json(removed))
}
