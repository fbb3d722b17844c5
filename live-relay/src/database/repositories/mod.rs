//! Repository layer.

pub mod tracked_account;

pub use tracked_account::{LiveStateRepository, SqlxLiveStateRepository};
