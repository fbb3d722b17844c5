//! Domain layer for live-relay.
//!
//! Value objects and entities shared by the store, the admission controller
//! and the reconciliation scheduler.

pub mod handle;
pub mod live_state;
pub mod status;

pub use handle::Handle;
pub use live_state::{CommentEntry, GiftEntry, LiveState, RECENT_CAPACITY, TrackedAccount};
pub use status::{AccountStatus, ProbeOutcome};
