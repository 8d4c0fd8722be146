//! Handlers for `/voice` endpoints, fed by the gateway bridge.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT`  | `/voice/snapshot` | Body: `[{"guild":1,"channel":2,"members":[{"user":3}]}]` |
//! | `POST` | `/voice/updates`  | Body: `{"guild":1,"user":3,"before":2,"after":null}` |
//! | `GET`  | `/voice/state`    | Tracked channels and pending disconnects |
//! | `GET`  | `/tick/status`    | Whether the tick loop runs, and its last cycle |

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use duostreak_core::{
  membership::{BootstrapSummary, ChannelSnapshot, VoiceUpdate},
  store::StreakStore,
};
use duostreak_tracker::{TickStatus, Tracker, VoiceView};
use serde::{Deserialize, Serialize};

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// `PUT /voice/snapshot`: replaces all membership and readies the tracker.
pub async fn snapshot<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Json(channels): Json<Vec<ChannelSnapshot>>,
) -> Json<BootstrapSummary>
where
  S: StreakStore + 'static,
{
  Json(tracker.bootstrap(channels).await)
}

// ─── Updates ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateAck {
  /// `false` when the update was ignored (bots).
  pub applied: bool,
}

/// `POST /voice/updates`
pub async fn update<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  Json(update): Json<VoiceUpdate>,
) -> Json<UpdateAck>
where
  S: StreakStore + 'static,
{
  let applied = tracker.apply_update(&update, Utc::now()).await;
  Json(UpdateAck { applied })
}

// ─── State ────────────────────────────────────────────────────────────────────

/// `GET /voice/state`
pub async fn state<S>(State(tracker): State<Arc<Tracker<S>>>) -> Json<VoiceView>
where
  S: StreakStore + 'static,
{
  Json(tracker.voice_view().await)
}

/// `GET /tick/status`
pub async fn tick_status<S>(State(tracker): State<Arc<Tracker<S>>>) -> Json<TickStatus>
where
  S: StreakStore + 'static,
{
  Json(tracker.tick_status())
}
