//! Events delivered by an open event stream.

use serde::{Deserialize, Serialize};

/// A domain event pushed by an event stream for one account.
///
/// The JSON form is internally tagged by `type`, e.g.
/// `{"type":"gift","user_id":"1","nickname":"a","gift_name":"rose","diamond_count":5}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Chat comment.
    Comment {
        user_id: String,
        nickname: String,
        comment: String,
    },
    /// Gift with an optional protocol-reported diamond value.
    Gift {
        user_id: String,
        nickname: String,
        gift_name: String,
        diamond_count: Option<u64>,
        repeat_count: Option<u32>,
    },
    /// Current viewer count.
    ViewerCount { viewer_count: u64 },
    /// A viewer followed the account.
    Follow { user_id: String, nickname: String },
    /// The broadcast ended.
    StreamEnded,
    /// The stream dropped without the broadcast being reported as ended.
    Disconnected { reason: Option<String> },
}

impl StreamEvent {
    /// Whether the stream delivers nothing after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::StreamEnded | StreamEvent::Disconnected { .. }
        )
    }
}
