//! [`Tracker`]: membership bookkeeping plus the periodic tick cycle.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Utc};
use duostreak_core::{
  config::{AfkPolicy, GuildConfig},
  duo::{GuildId, UserId},
  membership::{
    BootstrapSummary, ChannelSnapshot, PendingDisconnect, TrackedChannel, VoiceState, VoiceUpdate,
  },
  store::StreakStore,
};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::{Mutex, watch},
  time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

/// Users whose duo currently qualifies, per guild.
pub type QualifiedUsers = BTreeMap<GuildId, BTreeSet<UserId>>;

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
  /// The cycle ran before the first bootstrap and did nothing.
  pub skipped:   bool,
  pub guilds:    usize,
  /// Duos credited with a tick.
  pub duos:      usize,
  /// Duos whose day completed on this tick.
  pub completed: usize,
  /// Duos whose attribution failed and was dropped for this cycle.
  pub failed:    usize,
}

/// The most recent cycle and when it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCycle {
  pub at:     DateTime<Utc>,
  pub report: CycleReport,
}

/// Whether the tick loop is alive, and what it last did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStatus {
  pub running: bool,
  pub last:    Option<LastCycle>,
}

/// Debug view of the runtime membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceView {
  pub ready:    bool,
  pub channels: Vec<TrackedChannel>,
  pub pending:  Vec<PendingDisconnect>,
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

/// Runtime voice membership and the duo tick engine.
///
/// Membership lives behind a lock that is only ever held for in-memory work,
/// so presence updates are never stuck behind a slow store.
pub struct Tracker<S> {
  store:     Arc<S>,
  defaults:  GuildConfig,
  afk:       AfkPolicy,
  voice:     Mutex<VoiceState>,
  ready:     AtomicBool,
  running:   AtomicBool,
  qualified: watch::Sender<QualifiedUsers>,
  last:      watch::Sender<Option<LastCycle>>,
}

/// Clears the running flag however [`Tracker::run`] exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
  fn set(flag: &'a AtomicBool) -> Self {
    flag.store(true, Ordering::Release);
    Self(flag)
  }
}

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

impl<S> Tracker<S>
where
  S: StreakStore + 'static,
{
  /// `defaults` must already be validated; guild overrides are merged over
  /// it on every cycle.
  pub fn new(store: Arc<S>, defaults: GuildConfig, afk: AfkPolicy) -> Self {
    let (qualified, _) = watch::channel(QualifiedUsers::new());
    let (last, _) = watch::channel(None);
    Self {
      store,
      defaults,
      afk,
      voice: Mutex::new(VoiceState::new()),
      ready: AtomicBool::new(false),
      running: AtomicBool::new(false),
      qualified,
      last,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn defaults(&self) -> &GuildConfig { &self.defaults }

  /// Whether the first bootstrap has happened.
  pub fn is_ready(&self) -> bool { self.ready.load(Ordering::Acquire) }

  /// Receive the qualified-users signal published after each cycle.
  pub fn subscribe(&self) -> watch::Receiver<QualifiedUsers> { self.qualified.subscribe() }

  /// The most recently published qualified users.
  pub fn qualified(&self) -> QualifiedUsers { self.qualified.borrow().clone() }

  pub fn tick_status(&self) -> TickStatus {
    TickStatus { running: self.running.load(Ordering::Acquire), last: *self.last.borrow() }
  }

  // ── Presence ──────────────────────────────────────────────────────────────

  /// Replace all membership with a full snapshot of every voice channel and
  /// mark the tracker ready to tick.
  pub async fn bootstrap<I>(&self, snapshot: I) -> BootstrapSummary
  where
    I: IntoIterator<Item = ChannelSnapshot>,
  {
    let summary = self.voice.lock().await.bootstrap(snapshot, &self.afk);
    self.ready.store(true, Ordering::Release);
    info!(channels = summary.channels, tracked = summary.tracked, "voice bootstrap complete");
    summary
  }

  /// Apply one join/leave/move. Returns `false` for ignored (bot) updates.
  pub async fn apply_update(&self, update: &VoiceUpdate, at: DateTime<Utc>) -> bool {
    let applied = self.voice.lock().await.apply_update(update, at, &self.afk);
    debug!(
      guild = update.guild,
      user = update.user,
      before = ?update.before,
      after = ?update.after,
      applied,
      "voice update"
    );
    applied
  }

  pub async fn voice_view(&self) -> VoiceView {
    let voice = self.voice.lock().await;
    VoiceView {
      ready:    self.is_ready(),
      channels: voice.tracked(),
      pending:  voice.pending_disconnects(),
    }
  }

  // ── Config ────────────────────────────────────────────────────────────────

  /// The guild's overrides merged over the defaults.
  pub async fn effective_config(&self, guild: GuildId) -> Result<GuildConfig, S::Error> {
    let overrides = self.store.config_overrides(guild).await?;
    Ok(self.defaults.merge(overrides.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
  }

  // ── Tick cycle ────────────────────────────────────────────────────────────

  /// Run one attribution cycle as of `now` and record it as the last cycle.
  ///
  /// Each duo's attribution is independent: a store failure drops that
  /// duo's tick and the cycle moves on.
  pub async fn tick_once(&self, now: DateTime<Utc>) -> CycleReport {
    let report = self.cycle(now).await;
    self.last.send_replace(Some(LastCycle { at: now, report }));
    report
  }

  async fn cycle(&self, now: DateTime<Utc>) -> CycleReport {
    if !self.is_ready() {
      debug!("voice state not bootstrapped; skipping tick");
      return CycleReport { skipped: true, ..CycleReport::default() };
    }

    let mut report = CycleReport::default();
    let mut qualified = QualifiedUsers::new();
    let guilds = self.voice.lock().await.guilds();

    for guild in guilds {
      report.guilds += 1;
      let cfg = match self.effective_config(guild).await {
        Ok(cfg) => cfg,
        Err(e) => {
          warn!(guild, error = %e, "could not read guild overrides; using defaults");
          self.defaults.clone()
        }
      };
      let day = cfg.day_key(now);
      let min_required = cfg.min_required_seconds();

      let duos =
        self.voice.lock().await.effective_duos(guild, now, cfg.disconnect_buffer(), &self.afk);

      for (channel, pair) in duos {
        let outcome = self
          .store
          .record_tick(guild, pair, day, i64::from(cfg.tick_seconds), min_required, now)
          .await;

        match outcome {
          Ok(outcome) => {
            report.duos += 1;
            if outcome.completed_now {
              report.completed += 1;
              info!(
                guild,
                channel,
                duo = %pair,
                day = %day,
                streak = outcome.streak.current,
                "duo completed the day"
              );
            }
            if outcome.qualifies(min_required) {
              qualified.entry(guild).or_default().extend(pair.members());
            }
          }
          Err(e) => {
            report.failed += 1;
            warn!(guild, channel, duo = %pair, error = %e, "dropping tick for duo");
          }
        }
      }
    }

    self.qualified.send_replace(qualified);
    debug!(
      guilds = report.guilds,
      duos = report.duos,
      completed = report.completed,
      failed = report.failed,
      "tick cycle finished"
    );
    report
  }

  /// Tick every `period` until `shutdown` flips to `true` (or its sender is
  /// dropped).
  ///
  /// A cycle that has started always runs to completion. Each cycle runs on
  /// its own task, so a panic inside one is logged and the loop carries on.
  pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let _running = RunningGuard::set(&self.running);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs_f64(), "tick loop started");

    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            break;
          }
          continue;
        }
      }

      let tracker = Arc::clone(&self);
      let cycle = tokio::spawn(async move { tracker.tick_once(Utc::now()).await });
      if let Err(e) = cycle.await {
        error!(error = %e, "tick cycle aborted");
      }
    }

    info!("tick loop stopped");
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use chrono::{TimeDelta, TimeZone};
  use duostreak_core::{
    day::DayKey,
    duo::{ChannelId, DuoId, DuoPair, StorageCounts, TickOutcome},
    membership::VoiceMember,
    streak::StreakState,
  };
  use duostreak_store_sqlite::GuildStores;

  use super::*;

  const G: GuildId = 1;
  const VC: ChannelId = 100;
  const AFK_VC: ChannelId = 999;

  fn utc_defaults() -> GuildConfig {
    GuildConfig {
      timezone:                  chrono_tz::UTC,
      grace_hour:                0,
      min_overlap_seconds:       180,
      tick_seconds:              15,
      disconnect_buffer_seconds: 60,
    }
  }

  fn afk() -> AfkPolicy { AfkPolicy { ignore: true, channels: BTreeSet::from([AFK_VC]) } }

  fn tracker() -> Tracker<GuildStores> {
    Tracker::new(Arc::new(GuildStores::in_memory()), utc_defaults(), afk())
  }

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap() }

  fn secs(n: i64) -> TimeDelta { TimeDelta::seconds(n) }

  fn channel(guild: GuildId, channel: ChannelId, users: &[UserId]) -> ChannelSnapshot {
    ChannelSnapshot {
      guild,
      channel,
      members: users.iter().map(|&user| VoiceMember { user, bot: false }).collect(),
    }
  }

  fn update(user: UserId, before: Option<ChannelId>, after: Option<ChannelId>) -> VoiceUpdate {
    VoiceUpdate { guild: G, user, bot: false, before, after }
  }

  async fn today_seconds(t: &Tracker<GuildStores>, a: UserId, b: UserId, day: DayKey) -> i64 {
    let pair = DuoPair::new(a, b).unwrap();
    match t.store().find_duo(G, pair).await.unwrap() {
      Some(duo) => t.store().daily_seconds(G, duo, day).await.unwrap(),
      None => 0,
    }
  }

  #[tokio::test]
  async fn ticks_are_skipped_until_bootstrap() {
    let t = tracker();
    t.apply_update(&update(5, None, Some(VC)), t0()).await;
    t.apply_update(&update(9, None, Some(VC)), t0()).await;

    let report = t.tick_once(t0()).await;
    assert!(report.skipped);
    assert_eq!(t.store().counts(G).await.unwrap(), StorageCounts::default());

    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    assert!(t.is_ready());
    assert_eq!(t.tick_once(t0()).await.duos, 1);
  }

  #[tokio::test]
  async fn duo_scenario_across_days() {
    let t = tracker();
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let x = t.defaults().day_key(t0());

    for i in 0..11 {
      let report = t.tick_once(t0() + secs(15 * i)).await;
      assert_eq!(report.completed, 0);
    }
    assert!(t.qualified().is_empty(), "165s does not qualify yet");

    let report = t.tick_once(t0() + secs(165)).await;
    assert_eq!(report.completed, 1);
    assert_eq!(today_seconds(&t, 5, 9, x).await, 180);
    assert_eq!(t.qualified().get(&G), Some(&BTreeSet::from([5, 9])));

    let report = t.tick_once(t0() + secs(180)).await;
    assert_eq!(report.completed, 0);
    assert_eq!(today_seconds(&t, 5, 9, x).await, 195);

    let duo = t.store().find_duo(G, DuoPair::new(5, 9).unwrap()).await.unwrap().unwrap();
    assert_eq!(t.store().get_streak(G, duo).await.unwrap().current, 1);

    let next_day = t0() + TimeDelta::days(1);
    for i in 0..12 {
      t.tick_once(next_day + secs(15 * i)).await;
    }
    let streak = t.store().get_streak(G, duo).await.unwrap();
    assert_eq!((streak.current, streak.longest), (2, 2));

    let after_gap = t0() + TimeDelta::days(5);
    for i in 0..12 {
      t.tick_once(after_gap + secs(15 * i)).await;
    }
    let streak = t.store().get_streak(G, duo).await.unwrap();
    assert_eq!((streak.current, streak.longest), (1, 2));
    assert_eq!(streak.last_completed, Some(x.offset(5)));
  }

  #[tokio::test]
  async fn solo_and_crowded_channels_never_accumulate() {
    let t = tracker();
    t.bootstrap(vec![channel(G, 10, &[1]), channel(G, 20, &[2, 3, 4])]).await;

    for i in 0..30 {
      let report = t.tick_once(t0() + secs(15 * i)).await;
      assert_eq!(report.duos, 0);
    }
    assert_eq!(t.store().counts(G).await.unwrap().duos, 0);
  }

  #[tokio::test]
  async fn afk_channels_are_ignored() {
    let t = tracker();
    t.bootstrap(vec![channel(G, AFK_VC, &[1, 2])]).await;
    t.apply_update(&update(3, None, Some(AFK_VC)), t0()).await;
    assert_eq!(t.tick_once(t0()).await.duos, 0);
    assert!(t.voice_view().await.channels.is_empty());
  }

  #[tokio::test]
  async fn quick_reconnect_keeps_accumulating() {
    let t = tracker();
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let x = t.defaults().day_key(t0());

    t.tick_once(t0()).await;
    t.apply_update(&update(9, Some(VC), None), t0() + secs(5)).await;
    t.tick_once(t0() + secs(15)).await;
    t.tick_once(t0() + secs(30)).await;
    t.apply_update(&update(9, None, Some(VC)), t0() + secs(40)).await;
    t.tick_once(t0() + secs(45)).await;

    assert_eq!(today_seconds(&t, 5, 9, x).await, 60);
  }

  #[tokio::test]
  async fn expired_buffer_stops_crediting() {
    let t = tracker();
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let x = t.defaults().day_key(t0());

    t.tick_once(t0()).await;
    t.apply_update(&update(9, Some(VC), None), t0()).await;
    t.tick_once(t0() + secs(60)).await;
    t.tick_once(t0() + secs(75)).await;
    assert!(t.voice_view().await.pending.is_empty());

    t.apply_update(&update(9, None, Some(VC)), t0() + secs(80)).await;
    t.tick_once(t0() + secs(90)).await;

    // t0, t0+60 and t0+90; nothing for the lapsed tick at t0+75.
    assert_eq!(today_seconds(&t, 5, 9, x).await, 45);
  }

  #[tokio::test]
  async fn guild_overrides_apply_on_the_next_cycle() {
    let t = tracker();
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let x = t.defaults().day_key(t0());

    t.tick_once(t0()).await;
    t.store()
      .set_config_override(G, "tick_seconds".into(), "30".into(), t0())
      .await
      .unwrap();
    t.store()
      .set_config_override(G, "grace_hour".into(), "not-a-number".into(), t0())
      .await
      .unwrap();
    t.tick_once(t0() + secs(15)).await;

    assert_eq!(today_seconds(&t, 5, 9, x).await, 45);
    assert_eq!(t.effective_config(G).await.unwrap().grace_hour, 0);
  }

  #[tokio::test]
  async fn live_streak_qualifies_before_todays_threshold() {
    let t = tracker();
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let yesterday = t.defaults().day_key(t0()).prev();
    let duo = t.store().get_or_create_duo(G, DuoPair::new(5, 9).unwrap(), t0()).await.unwrap();
    t.store()
      .save_streak(
        G,
        duo,
        StreakState { current: 3, longest: 3, last_completed: Some(yesterday) },
        t0(),
      )
      .await
      .unwrap();

    t.tick_once(t0()).await;
    assert_eq!(t.qualified().get(&G), Some(&BTreeSet::from([5, 9])));

    // The duo broke up: the next cycle publishes an empty set.
    t.apply_update(&update(9, Some(VC), Some(200)), t0() + secs(10)).await;
    t.tick_once(t0() + secs(15)).await;
    assert!(t.qualified().is_empty());
  }

  #[tokio::test]
  async fn run_ticks_until_shutdown() {
    let t = Arc::new(tracker());
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let mut signal = t.subscribe();

    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&t).run(Duration::from_millis(20), shutdown));

    tokio::time::timeout(Duration::from_secs(5), signal.changed())
      .await
      .expect("a cycle publishes the signal")
      .unwrap();
    assert!(t.tick_status().running);
    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .expect("loop stops")
      .unwrap();

    assert!(t.store().counts(G).await.unwrap().daily_rows >= 1);
    let status = t.tick_status();
    assert!(!status.running);
    assert!(status.last.is_some_and(|last| last.report.duos == 1));
  }

  #[tokio::test]
  async fn tick_status_records_the_last_cycle() {
    let t = tracker();
    assert_eq!(t.tick_status(), TickStatus { running: false, last: None });

    t.tick_once(t0()).await;
    let skipped = t.tick_status().last.unwrap();
    assert_eq!(skipped.at, t0());
    assert!(skipped.report.skipped);

    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    t.tick_once(t0() + secs(15)).await;
    let last = t.tick_status().last.unwrap();
    assert_eq!(last.at, t0() + secs(15));
    assert_eq!(last.report, CycleReport { guilds: 1, duos: 1, ..CycleReport::default() });
  }

  // ─── Failure isolation ─────────────────────────────────────────────────────

  #[derive(Debug, thiserror::Error)]
  enum FlakyError {
    #[error("storage offline for {0}")]
    Offline(DuoPair),
    #[error("settings unreadable for guild {0}")]
    Settings(GuildId),
    #[error(transparent)]
    Store(#[from] duostreak_store_sqlite::Error),
  }

  /// Delegates to in-memory stores but refuses ticks for duos containing
  /// [`Flaky::BROKEN_USER`] and override reads for [`Flaky::BROKEN_GUILD`].
  /// With `panic_next` set, the next `record_tick` panics instead.
  struct Flaky {
    inner:      GuildStores,
    panic_next: AtomicBool,
    ticks:      std::sync::atomic::AtomicUsize,
  }

  impl Flaky {
    const BROKEN_USER: UserId = 666;
    const BROKEN_GUILD: GuildId = 13;

    fn new() -> Self {
      Self {
        inner:      GuildStores::in_memory(),
        panic_next: AtomicBool::new(false),
        ticks:      Default::default(),
      }
    }
  }

  impl StreakStore for Flaky {
    type Error = FlakyError;

    async fn get_or_create_duo(
      &self,
      guild: GuildId,
      pair: DuoPair,
      now: DateTime<Utc>,
    ) -> Result<DuoId, FlakyError> {
      Ok(self.inner.get_or_create_duo(guild, pair, now).await?)
    }

    async fn find_duo(&self, guild: GuildId, pair: DuoPair) -> Result<Option<DuoId>, FlakyError> {
      Ok(self.inner.find_duo(guild, pair).await?)
    }

    async fn duo_members(&self, guild: GuildId, duo: DuoId) -> Result<Option<DuoPair>, FlakyError> {
      Ok(self.inner.duo_members(guild, duo).await?)
    }

    async fn add_daily_seconds(
      &self,
      guild: GuildId,
      duo: DuoId,
      day: DayKey,
      seconds: i64,
      now: DateTime<Utc>,
    ) -> Result<i64, FlakyError> {
      Ok(self.inner.add_daily_seconds(guild, duo, day, seconds, now).await?)
    }

    async fn daily_seconds(&self, guild: GuildId, duo: DuoId, day: DayKey) -> Result<i64, FlakyError> {
      Ok(self.inner.daily_seconds(guild, duo, day).await?)
    }

    async fn day_map(
      &self,
      guild: GuildId,
      duo: DuoId,
      first: DayKey,
      last: DayKey,
    ) -> Result<BTreeMap<DayKey, i64>, FlakyError> {
      Ok(self.inner.day_map(guild, duo, first, last).await?)
    }

    async fn connection_score(&self, guild: GuildId, duo: DuoId) -> Result<i64, FlakyError> {
      Ok(self.inner.connection_score(guild, duo).await?)
    }

    async fn get_streak(&self, guild: GuildId, duo: DuoId) -> Result<StreakState, FlakyError> {
      Ok(self.inner.get_streak(guild, duo).await?)
    }

    async fn save_streak(
      &self,
      guild: GuildId,
      duo: DuoId,
      state: StreakState,
      now: DateTime<Utc>,
    ) -> Result<(), FlakyError> {
      Ok(self.inner.save_streak(guild, duo, state, now).await?)
    }

    async fn record_tick(
      &self,
      guild: GuildId,
      pair: DuoPair,
      day: DayKey,
      seconds: i64,
      min_required_seconds: i64,
      now: DateTime<Utc>,
    ) -> Result<TickOutcome, FlakyError> {
      self.ticks.fetch_add(1, Ordering::SeqCst);
      if self.panic_next.swap(false, Ordering::SeqCst) {
        panic!("record_tick blew up for {pair}");
      }
      if pair.contains(Self::BROKEN_USER) {
        return Err(FlakyError::Offline(pair));
      }
      Ok(self.inner.record_tick(guild, pair, day, seconds, min_required_seconds, now).await?)
    }

    async fn recalc_day(
      &self,
      guild: GuildId,
      day: DayKey,
      min_required_seconds: i64,
      now: DateTime<Utc>,
    ) -> Result<usize, FlakyError> {
      Ok(self.inner.recalc_day(guild, day, min_required_seconds, now).await?)
    }

    async fn config_overrides(&self, guild: GuildId) -> Result<Vec<(String, String)>, FlakyError> {
      if guild == Self::BROKEN_GUILD {
        return Err(FlakyError::Settings(guild));
      }
      Ok(self.inner.config_overrides(guild).await?)
    }

    async fn set_config_override(
      &self,
      guild: GuildId,
      key: String,
      value: String,
      now: DateTime<Utc>,
    ) -> Result<(), FlakyError> {
      Ok(self.inner.set_config_override(guild, key, value, now).await?)
    }

    async fn clear_config_override(&self, guild: GuildId, key: String) -> Result<bool, FlakyError> {
      Ok(self.inner.clear_config_override(guild, key).await?)
    }

    async fn counts(&self, guild: GuildId) -> Result<StorageCounts, FlakyError> {
      Ok(self.inner.counts(guild).await?)
    }

    async fn reset_guild(&self, guild: GuildId) -> Result<StorageCounts, FlakyError> {
      Ok(self.inner.reset_guild(guild).await?)
    }
  }

  #[tokio::test]
  async fn one_failing_duo_does_not_abort_the_cycle() {
    let t = Tracker::new(Arc::new(Flaky::new()), utc_defaults(), afk());
    t.bootstrap(vec![channel(G, 10, &[Flaky::BROKEN_USER, 2]), channel(G, 20, &[3, 4])]).await;

    let report = t.tick_once(t0()).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.duos, 1);
    assert_eq!(t.store().counts(G).await.unwrap().daily_rows, 1);
  }

  #[tokio::test]
  async fn unreadable_overrides_fall_back_to_defaults() {
    let t = Tracker::new(Arc::new(Flaky::new()), utc_defaults(), afk());
    let g = Flaky::BROKEN_GUILD;
    t.bootstrap(vec![channel(g, VC, &[5, 9])]).await;

    let report = t.tick_once(t0()).await;
    assert_eq!((report.guilds, report.duos, report.failed), (1, 1, 0));

    let duo = t.store().find_duo(g, DuoPair::new(5, 9).unwrap()).await.unwrap().unwrap();
    let day = utc_defaults().day_key(t0());
    assert_eq!(t.store().daily_seconds(g, duo, day).await.unwrap(), 15);
  }

  #[tokio::test]
  async fn run_keeps_ticking_after_a_cycle_panics() {
    let store = Arc::new(Flaky::new());
    store.panic_next.store(true, Ordering::SeqCst);
    let t = Arc::new(Tracker::new(Arc::clone(&store), utc_defaults(), afk()));
    t.bootstrap(vec![channel(G, VC, &[5, 9])]).await;
    let mut signal = t.subscribe();

    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&t).run(Duration::from_millis(20), shutdown));

    // The panicking cycle never publishes; the next one does.
    tokio::time::timeout(Duration::from_secs(5), signal.changed())
      .await
      .expect("a later cycle publishes the signal")
      .unwrap();
    assert!(t.tick_status().running);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .expect("loop stops after the panic")
      .unwrap();

    assert!(!store.panic_next.load(Ordering::SeqCst));
    assert!(store.ticks.load(Ordering::SeqCst) >= 2);
    let duo = store.find_duo(G, DuoPair::new(5, 9).unwrap()).await.unwrap().unwrap();
    let day = utc_defaults().day_key(Utc::now());
    assert!(store.daily_seconds(G, duo, day).await.unwrap() >= 15);
    assert!(!t.tick_status().running);
  }
}
