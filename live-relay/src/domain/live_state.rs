//! Per-account live state.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountStatus, Handle};

/// Number of recent comments and gifts retained per account.
pub const RECENT_CAPACITY: usize = 10;

/// A chat comment as kept in the recent buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    pub user_id: String,
    pub nickname: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

/// A gift as kept in the recent buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftEntry {
    pub user_id: String,
    pub nickname: String,
    pub gift_name: String,
    pub repeat_count: u32,
    /// Diamond value credited for this gift.
    pub diamonds: u64,
    pub timestamp: DateTime<Utc>,
}

impl GiftEntry {
    /// Diamond value of a gift: the reported value, else the repeat count, never below 1.
    pub fn diamond_value(reported: Option<u64>, repeat_count: Option<u32>) -> u64 {
        reported
            .filter(|v| *v > 0)
            .or_else(|| repeat_count.map(u64::from).filter(|v| *v > 0))
            .unwrap_or(1)
    }
}

/// Latest known state of one tracked account.
///
/// Counters only grow while the account is tracked; they are dropped together
/// with the account and never reset on live/offline flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    pub is_live: bool,
    pub viewer_count: u64,
    pub total_comments: u64,
    pub total_gifts: u64,
    pub total_diamonds: u64,
    pub total_follows: u64,
    /// Newest first, at most [`RECENT_CAPACITY`] entries.
    pub recent_comments: VecDeque<CommentEntry>,
    /// Newest first, at most [`RECENT_CAPACITY`] entries.
    pub recent_gifts: VecDeque<GiftEntry>,
    pub last_update: DateTime<Utc>,
}

impl LiveState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            is_live: false,
            viewer_count: 0,
            total_comments: 0,
            total_gifts: 0,
            total_diamonds: 0,
            total_follows: 0,
            recent_comments: VecDeque::with_capacity(RECENT_CAPACITY),
            recent_gifts: VecDeque::with_capacity(RECENT_CAPACITY),
            last_update: now,
        }
    }

    pub fn record_comment(&mut self, entry: CommentEntry) {
        self.total_comments = self.total_comments.saturating_add(1);
        self.last_update = entry.timestamp;
        push_recent(&mut self.recent_comments, entry);
    }

    pub fn record_gift(&mut self, entry: GiftEntry) {
        self.total_gifts = self.total_gifts.saturating_add(1);
        self.total_diamonds = self.total_diamonds.saturating_add(entry.diamonds);
        self.last_update = entry.timestamp;
        push_recent(&mut self.recent_gifts, entry);
    }

    pub fn record_follow(&mut self, now: DateTime<Utc>) {
        self.total_follows = self.total_follows.saturating_add(1);
        self.last_update = now;
    }

    pub fn set_viewer_count(&mut self, viewer_count: u64, now: DateTime<Utc>) {
        self.viewer_count = viewer_count;
        self.last_update = now;
    }

    /// Set the live flag; returns whether it changed.
    pub fn set_live(&mut self, is_live: bool, now: DateTime<Utc>) -> bool {
        let changed = self.is_live != is_live;
        self.is_live = is_live;
        self.last_update = now;
        changed
    }

    /// Whether two states differ in anything but the heartbeat timestamp.
    pub fn same_content(&self, other: &LiveState) -> bool {
        self.is_live == other.is_live
            && self.viewer_count == other.viewer_count
            && self.total_comments == other.total_comments
            && self.total_gifts == other.total_gifts
            && self.total_diamonds == other.total_diamonds
            && self.total_follows == other.total_follows
            && self.recent_comments == other.recent_comments
            && self.recent_gifts == other.recent_gifts
    }
}

fn push_recent<T>(buffer: &mut VecDeque<T>, entry: T) {
    buffer.push_front(entry);
    buffer.truncate(RECENT_CAPACITY);
}

/// A tracked account as held in memory and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAccount {
    pub handle: Handle,
    pub state: LiveState,
    pub status: AccountStatus,
    pub tracked_at: DateTime<Utc>,
}

impl TrackedAccount {
    pub fn new(handle: Handle, status: AccountStatus, now: DateTime<Utc>) -> Self {
        Self {
            handle,
            state: LiveState::new(now),
            status,
            tracked_at: now,
        }
    }
}
