//! Handlers for `/guilds/{guild}/duos` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/guilds/{guild}/duos/{a}/{b}` | 404 if the pair never shared a channel |
//! | `GET`  | `/guilds/{guild}/duos/{a}/{b}/days` | Optional `?days=N` (1..=366, default 28) |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{NaiveDate, Utc};
use duostreak_core::{
  config::GuildConfig,
  day::DayKey,
  duo::{DuoId, DuoPair, DuoStatus, GuildId, UserId},
  store::StreakStore,
};
use duostreak_tracker::Tracker;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

const DEFAULT_WINDOW_DAYS: u32 = 28;
const MAX_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Deserialize)]
pub struct DuoPath {
  pub guild: GuildId,
  pub a:     UserId,
  pub b:     UserId,
}

/// Resolve the path to the guild's effective config and an existing duo.
async fn resolve<S>(
  tracker: &Tracker<S>,
  path: &DuoPath,
) -> Result<(GuildConfig, DuoPair, DuoId), ApiError>
where
  S: StreakStore + 'static,
{
  let pair = DuoPair::new(path.a, path.b)?;
  let cfg = tracker.effective_config(path.guild).await.map_err(ApiError::store)?;
  let duo = tracker
    .store()
    .find_duo(path.guild, pair)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("no duo {pair} in guild {}", path.guild)))?;
  Ok((cfg, pair, duo))
}

// ─── Status ───────────────────────────────────────────────────────────────────

/// `GET /guilds/{guild}/duos/{a}/{b}`
pub async fn status<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(path): Path<DuoPath>,
) -> Result<Json<DuoStatus>, ApiError>
where
  S: StreakStore + 'static,
{
  let (cfg, pair, duo_id) = resolve(&tracker, &path).await?;
  let store = tracker.store();
  let day = cfg.day_key(Utc::now());

  let today_seconds = store.daily_seconds(path.guild, duo_id, day).await.map_err(ApiError::store)?;
  let streak = store.get_streak(path.guild, duo_id).await.map_err(ApiError::store)?;
  let connection_score =
    store.connection_score(path.guild, duo_id).await.map_err(ApiError::store)?;

  Ok(Json(DuoStatus {
    pair,
    duo_id,
    day,
    today_seconds,
    min_required_seconds: cfg.min_required_seconds(),
    completed_today: streak.last_completed == Some(day),
    streak,
    connection_score,
  }))
}

// ─── Day window ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WindowParams {
  pub days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DayEntry {
  pub day:     DayKey,
  pub date:    Option<NaiveDate>,
  pub seconds: i64,
}

/// One entry per day of the window, oldest first; days with no overlap
/// read as zero.
#[derive(Debug, Serialize, Deserialize)]
pub struct DayWindow {
  pub pair:   DuoPair,
  pub duo_id: DuoId,
  pub days:   Vec<DayEntry>,
}

/// `GET /guilds/{guild}/duos/{a}/{b}/days[?days=N]`
pub async fn days<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Path(path): Path<DuoPath>,
  Query(params): Query<WindowParams>,
) -> Result<Json<DayWindow>, ApiError>
where
  S: StreakStore + 'static,
{
  let window = params.days.unwrap_or(DEFAULT_WINDOW_DAYS);
  if !(1..=MAX_WINDOW_DAYS).contains(&window) {
    return Err(ApiError::BadRequest(format!("days must be in 1..={MAX_WINDOW_DAYS}")));
  }

  let (cfg, pair, duo_id) = resolve(&tracker, &path).await?;
  let last = cfg.day_key(Utc::now());
  let first = last.offset(-i64::from(window - 1));
  let map = tracker
    .store()
    .day_map(path.guild, duo_id, first, last)
    .await
    .map_err(ApiError::store)?;

  let days = (first.0..=last.0)
    .map(DayKey)
    .map(|day| DayEntry {
      day,
      date: day.date(),
      seconds: map.get(&day).copied().unwrap_or(0),
    })
    .collect();

  Ok(Json(DayWindow { pair, duo_id, days }))
}
