//! Observer notifications.
//!
//! The core pushes state transitions and stream events to a [`Notifier`]
//! and never waits on it.

mod events;

pub use events::{OfflineReason, RelayEvent, RelayEventBroadcaster};

/// Sink for relay events.
///
/// Implementations must not block: the store calls `notify` while holding
/// the per-account lock so that observers see events in mutation order.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: RelayEvent);
}
