//! The duo tick engine.
//!
//! [`Tracker`] owns the runtime voice membership, applies presence updates
//! as they arrive, and on a fixed cadence credits every channel holding
//! exactly two people with one tick of overlap. Elapsed time is sampled, not
//! measured: a skipped cycle is never backfilled.

mod tracker;

pub use tracker::{CycleReport, LastCycle, QualifiedUsers, TickStatus, Tracker, VoiceView};
