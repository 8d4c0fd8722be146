//! Runtime voice membership: who is in which channel right now.
//!
//! Nothing here is persisted. The index is rebuilt from a full snapshot at
//! startup and kept current from join/leave/move updates. Bots never appear
//! in it, and empty channels are dropped rather than kept as empty sets.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  config::AfkPolicy,
  duo::{ChannelId, DuoPair, GuildId, UserId},
};

// ─── Presence inputs ─────────────────────────────────────────────────────────

/// One occupant reported by the presence source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMember {
  pub user: UserId,
  #[serde(default)]
  pub bot:  bool,
}

/// A voice channel and everyone currently in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
  pub guild:   GuildId,
  pub channel: ChannelId,
  pub members: Vec<VoiceMember>,
}

/// A single voice-state change: join (`before` empty), leave (`after` empty),
/// or move between channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceUpdate {
  pub guild:  GuildId,
  pub user:   UserId,
  #[serde(default)]
  pub bot:    bool,
  pub before: Option<ChannelId>,
  pub after:  Option<ChannelId>,
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// A user's most recent disconnect, kept for the disconnect buffer window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeftRecord {
  pub channel: ChannelId,
  pub left_at: DateTime<Utc>,
}

/// One tracked channel, as reported by [`VoiceState::tracked`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChannel {
  pub guild:   GuildId,
  pub channel: ChannelId,
  pub members: BTreeSet<UserId>,
}

/// One pending disconnect, as reported by [`VoiceState::pending_disconnects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDisconnect {
  pub guild: GuildId,
  pub user:  UserId,
  #[serde(flatten)]
  pub left:  LeftRecord,
}

/// Totals from [`VoiceState::bootstrap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSummary {
  /// Channels seen in the snapshot.
  pub channels: usize,
  /// Channels with at least one non-bot occupant, now tracked.
  pub tracked:  usize,
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Channel occupancy plus the recently-disconnected buffer.
///
/// The buffer holds a single slot per `(guild, user)`: a second disconnect
/// overwrites the first, whatever channel it came from.
#[derive(Debug, Default)]
pub struct VoiceState {
  channels:      BTreeMap<GuildId, BTreeMap<ChannelId, BTreeSet<UserId>>>,
  recently_left: BTreeMap<(GuildId, UserId), LeftRecord>,
}

impl VoiceState {
  pub fn new() -> Self { Self::default() }

  /// Replace the occupant set of a channel. An empty set stops tracking it.
  pub fn set_channel_members(
    &mut self,
    guild: GuildId,
    channel: ChannelId,
    members: BTreeSet<UserId>,
  ) {
    if members.is_empty() {
      self.remove_channel(guild, channel);
    } else {
      self.channels.entry(guild).or_default().insert(channel, members);
    }
  }

  /// Stop tracking a channel, and the guild too once it has none left.
  pub fn remove_channel(&mut self, guild: GuildId, channel: ChannelId) {
    if let Some(channels) = self.channels.get_mut(&guild) {
      channels.remove(&channel);
      if channels.is_empty() {
        self.channels.remove(&guild);
      }
    }
  }

  pub fn mark_left(
    &mut self,
    guild: GuildId,
    user: UserId,
    channel: ChannelId,
    left_at: DateTime<Utc>,
  ) {
    self.recently_left.insert((guild, user), LeftRecord { channel, left_at });
  }

  pub fn clear_left(&mut self, guild: GuildId, user: UserId) {
    self.recently_left.remove(&(guild, user));
  }

  pub fn members(&self, guild: GuildId, channel: ChannelId) -> Option<&BTreeSet<UserId>> {
    self.channels.get(&guild)?.get(&channel)
  }

  pub fn left_record(&self, guild: GuildId, user: UserId) -> Option<&LeftRecord> {
    self.recently_left.get(&(guild, user))
  }

  /// Guilds with at least one tracked channel.
  pub fn guilds(&self) -> Vec<GuildId> { self.channels.keys().copied().collect() }

  pub fn tracked(&self) -> Vec<TrackedChannel> {
    self
      .channels
      .iter()
      .flat_map(|(&guild, channels)| {
        channels.iter().map(move |(&channel, members)| TrackedChannel {
          guild,
          channel,
          members: members.clone(),
        })
      })
      .collect()
  }

  pub fn pending_disconnects(&self) -> Vec<PendingDisconnect> {
    self
      .recently_left
      .iter()
      .map(|(&(guild, user), &left)| PendingDisconnect { guild, user, left })
      .collect()
  }

  /// Rebuild channel occupancy from a complete snapshot of every voice
  /// channel. Bots, ignored AFK channels and empty channels are left out.
  pub fn bootstrap<I>(&mut self, snapshot: I, afk: &AfkPolicy) -> BootstrapSummary
  where
    I: IntoIterator<Item = ChannelSnapshot>,
  {
    self.channels.clear();
    let mut summary = BootstrapSummary::default();

    for ch in snapshot {
      summary.channels += 1;
      if afk.ignores(ch.channel) {
        continue;
      }
      let humans: BTreeSet<UserId> =
        ch.members.iter().filter(|m| !m.bot).map(|m| m.user).collect();
      if !humans.is_empty() {
        summary.tracked += 1;
      }
      self.set_channel_members(ch.guild, ch.channel, humans);
    }

    summary
  }

  /// Apply one voice-state change. Returns `false` if it was ignored (bots).
  pub fn apply_update(&mut self, update: &VoiceUpdate, at: DateTime<Utc>, afk: &AfkPolicy) -> bool {
    if update.bot {
      return false;
    }
    let VoiceUpdate { guild, user, before, after, .. } = *update;

    match (before, after) {
      (Some(from), None) => self.mark_left(guild, user, from, at),
      (_, Some(_)) => self.clear_left(guild, user),
      (None, None) => {}
    }

    if before != after
      && let Some(from) = before
      && let Some(members) = self.channels.get_mut(&guild).and_then(|c| c.get_mut(&from))
    {
      members.remove(&user);
      if members.is_empty() {
        self.remove_channel(guild, from);
      }
    }

    if let Some(to) = after
      && !afk.ignores(to)
    {
      self.channels.entry(guild).or_default().entry(to).or_default().insert(user);
    }

    true
  }

  /// The occupants of `channel` plus anyone who disconnected from it within
  /// `buffer` of `now`.
  ///
  /// Expired disconnect records for the guild are purged along the way.
  pub fn effective_members(
    &mut self,
    guild: GuildId,
    channel: ChannelId,
    now: DateTime<Utc>,
    buffer: TimeDelta,
  ) -> BTreeSet<UserId> {
    let mut effective = self.members(guild, channel).cloned().unwrap_or_default();

    self.recently_left.retain(|&(g, user), left| {
      if g != guild {
        return true;
      }
      if now - left.left_at > buffer {
        return false;
      }
      if left.channel == channel {
        effective.insert(user);
      }
      true
    });

    effective
  }

  /// Every channel in `guild` whose effective membership is exactly two
  /// people, with the pair canonicalised.
  ///
  /// Channels with one occupant, or three or more, produce nothing.
  pub fn effective_duos(
    &mut self,
    guild: GuildId,
    now: DateTime<Utc>,
    buffer: TimeDelta,
    afk: &AfkPolicy,
  ) -> Vec<(ChannelId, DuoPair)> {
    let channels: Vec<ChannelId> = match self.channels.get(&guild) {
      Some(channels) => channels.keys().copied().collect(),
      None => return Vec::new(),
    };

    let mut duos = Vec::new();
    for channel in channels {
      if afk.ignores(channel) {
        continue;
      }
      let effective = self.effective_members(guild, channel, now, buffer);
      if effective.len() != 2 {
        continue;
      }
      let mut it = effective.into_iter();
      if let (Some(a), Some(b)) = (it.next(), it.next())
        && let Ok(pair) = DuoPair::new(a, b)
      {
        duos.push((channel, pair));
      }
    }
    duos
  }
}
