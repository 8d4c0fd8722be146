//! Error types for `duostreak-core`.

use thiserror::Error;

use crate::duo::UserId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot form a duo of user {0} with themselves")]
  InvalidDuo(UserId),

  #[error("unknown timezone: {0:?}")]
  UnknownTimezone(String),

  #[error("invalid value for {key}: {reason}")]
  InvalidConfig { key: &'static str, reason: String },

  #[error("unknown config key: {0:?}")]
  UnknownConfigKey(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
