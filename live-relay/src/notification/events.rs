//! Relay events for observers.
//!
//! This module defines events emitted by the store, the admission controller
//! and the reconciliation scheduler for consumption by observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{AccountStatus, CommentEntry, GiftEntry, Handle, LiveState};

use super::Notifier;

/// Why an account went offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineReason {
    /// A reconciliation probe resolved the account as offline.
    Probe,
    /// The event stream reported the broadcast ended.
    StreamEnded,
}

/// Events forwarded to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// An account started being tracked.
    AccountTracked {
        handle: Handle,
        status: AccountStatus,
        queue_position: Option<usize>,
        timestamp: DateTime<Utc>,
    },
    /// An account stopped being tracked.
    AccountRemoved {
        handle: Handle,
        timestamp: DateTime<Utc>,
    },
    /// An account went live.
    WentLive {
        handle: Handle,
        timestamp: DateTime<Utc>,
    },
    /// An account went offline.
    WentOffline {
        handle: Handle,
        reason: OfflineReason,
        timestamp: DateTime<Utc>,
    },
    /// The desired connection status changed.
    StatusChanged {
        handle: Handle,
        status: AccountStatus,
        timestamp: DateTime<Utc>,
    },
    /// Live state changed; carries the full new state.
    StateUpdated { handle: Handle, state: LiveState },
    /// A chat comment arrived.
    Comment { handle: Handle, comment: CommentEntry },
    /// A gift arrived.
    Gift { handle: Handle, gift: GiftEntry },
    /// A viewer followed the account.
    Follow {
        handle: Handle,
        user_id: String,
        nickname: String,
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    /// The account this event concerns.
    pub fn handle(&self) -> &Handle {
        match self {
            RelayEvent::AccountTracked { handle, .. }
            | RelayEvent::AccountRemoved { handle, .. }
            | RelayEvent::WentLive { handle, .. }
            | RelayEvent::WentOffline { handle, .. }
            | RelayEvent::StatusChanged { handle, .. }
            | RelayEvent::StateUpdated { handle, .. }
            | RelayEvent::Comment { handle, .. }
            | RelayEvent::Gift { handle, .. }
            | RelayEvent::Follow { handle, .. } => handle,
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            RelayEvent::AccountTracked {
                handle,
                status,
                queue_position,
                ..
            } => match queue_position {
                Some(position) => format!("{} tracked ({}, queue #{})", handle, status, position),
                None => format!("{} tracked ({})", handle, status),
            },
            RelayEvent::AccountRemoved { handle, .. } => format!("{} untracked", handle),
            RelayEvent::WentLive { handle, .. } => format!("{} went live", handle),
            RelayEvent::WentOffline { handle, reason, .. } => {
                format!("{} went offline ({:?})", handle, reason)
            }
            RelayEvent::StatusChanged { handle, status, .. } => {
                format!("{} is now {}", handle, status)
            }
            RelayEvent::StateUpdated { handle, state } => format!(
                "{}: live={} viewers={} comments={} gifts={} diamonds={}",
                handle,
                state.is_live,
                state.viewer_count,
                state.total_comments,
                state.total_gifts,
                state.total_diamonds
            ),
            RelayEvent::Comment { handle, comment } => {
                format!("{} <{}> {}", handle, comment.nickname, comment.comment)
            }
            RelayEvent::Gift { handle, gift } => format!(
                "{} <{}> sent {} x{} ({} diamonds)",
                handle, gift.nickname, gift.gift_name, gift.repeat_count, gift.diamonds
            ),
            RelayEvent::Follow {
                handle, nickname, ..
            } => format!("{} followed by {}", handle, nickname),
        }
    }

    /// Whether this event is a live/offline transition.
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            RelayEvent::WentLive { .. } | RelayEvent::WentOffline { .. }
        )
    }
}

/// Broadcaster for relay events.
pub struct RelayEventBroadcaster {
    sender: broadcast::Sender<RelayEvent>,
}

impl RelayEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to relay events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Notifier for RelayEventBroadcaster {
    fn notify(&self, event: RelayEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for RelayEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RelayEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
