//! JSON HTTP API for duostreak.
//!
//! Exposes an axum [`Router`] over a [`Tracker`]: the voice-presence
//! ingestion endpoints a gateway bridge posts to, read endpoints over duo
//! totals and streaks, and per-guild config overrides. Auth and TLS are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(duostreak_api::api_router(tracker.clone()))
//! ```

pub mod duos;
pub mod error;
pub mod guilds;
pub mod voice;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use duostreak_core::store::StreakStore;
use duostreak_tracker::Tracker;

pub use error::ApiError;

/// Build a fully-materialised API router for `tracker`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(tracker: Arc<Tracker<S>>) -> Router<()>
where
  S: StreakStore + 'static,
{
  Router::new()
    // Presence
    .route("/voice/snapshot", put(voice::snapshot::<S>))
    .route("/voice/updates", post(voice::update::<S>))
    .route("/voice/state", get(voice::state::<S>))
    .route("/tick/status", get(voice::tick_status::<S>))
    // Duos
    .route("/guilds/{guild}/duos/{a}/{b}", get(duos::status::<S>))
    .route("/guilds/{guild}/duos/{a}/{b}/days", get(duos::days::<S>))
    // Guild
    .route("/guilds/{guild}/day-key", get(guilds::day_key::<S>))
    .route("/guilds/{guild}/config", get(guilds::config::<S>))
    .route(
      "/guilds/{guild}/config/{key}",
      put(guilds::set_config::<S>).delete(guilds::clear_config::<S>),
    )
    .route("/guilds/{guild}/recalc", post(guilds::recalc::<S>))
    .route("/guilds/{guild}/counts", get(guilds::counts::<S>))
    .route("/guilds/{guild}/qualified", get(guilds::qualified::<S>))
    .route("/guilds/{guild}/data", delete(guilds::reset::<S>))
    .with_state(tracker)
}

// ─── Integration tests ────────────────────────────────────────────────────────
