//! Database models.

mod tracked_account;

pub use tracked_account::TrackedAccountDbModel;
