//! SQLite backend for duo streak storage.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread per guild database without blocking the async runtime. Each guild
//! has its own file; [`GuildStores`] opens them on demand and implements
//! [`duostreak_core::store::StreakStore`].

mod encode;
mod guilds;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use guilds::GuildStores;
pub use store::SqliteStore;
