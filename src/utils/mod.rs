//! Common utilities and helpers

pub mod config;
pub mod errors;
pub mod timer;
