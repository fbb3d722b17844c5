//! live-relay library crate.
//!
//! Keeps a bounded pool of live event streams open for a set of tracked
//! accounts, queues the rest, and periodically reconciles who is actually
//! live.

pub mod admission;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod services;
pub mod state;
pub mod stream;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
