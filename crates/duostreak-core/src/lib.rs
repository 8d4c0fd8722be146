//! Core types and rules for duo streak tracking.
//!
//! A duo is exactly two people sharing a voice channel. This crate holds the
//! pieces that decide what a tick of co-presence is worth: the day-key clock,
//! the streak transition rule, typed guild configuration, and the runtime
//! membership index. It has no database or HTTP dependencies; storage
//! backends implement [`store::StreakStore`].

// Native `async fn` in traits; the store trait spells out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod day;
pub mod duo;
pub mod error;
pub mod membership;
pub mod store;
pub mod streak;

pub use error::{Error, Result};
