//! Timeline replay

pub mod scheduler;
pub mod strategy;

pub use scheduler::{PlaybackScheduler, MIN_SAFE_BUFFER_LEN};
pub use strategy::{PlaybackEffect, StrategyRegistry};
