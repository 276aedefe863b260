//! Keystone storage — SQLite persistence for simulation results.
//!
//! A single durable `key → JSON` cache makes every expensive simulation
//! batch resumable and idempotent across process restarts.

pub mod cache;
pub mod schema;

pub use cache::{CacheKind, ResultCache};
