//! Tracked account database model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{AccountStatus, Handle, LiveState, TrackedAccount};
use crate::{Error, Result};

/// Row of the `tracked_accounts` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackedAccountDbModel {
    pub handle: String,
    /// AccountStatus: monitoring | waiting
    pub status: String,
    pub is_live: bool,
    pub viewer_count: i64,
    pub total_comments: i64,
    pub total_gifts: i64,
    pub total_diamonds: i64,
    pub total_follows: i64,
    /// JSON array of CommentEntry, newest first.
    pub recent_comments: String,
    /// JSON array of GiftEntry, newest first.
    pub recent_gifts: String,
    /// RFC 3339 UTC timestamp, nanosecond precision.
    pub last_update: String,
    /// RFC 3339 UTC timestamp, nanosecond precision.
    pub created_at: String,
}

impl TrackedAccountDbModel {
    /// Build a row from in-memory state.
    pub fn from_state(
        handle: &Handle,
        state: &LiveState,
        status: AccountStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            handle: handle.as_str().to_string(),
            status: status.as_str().to_string(),
            is_live: state.is_live,
            viewer_count: to_db_count(state.viewer_count),
            total_comments: to_db_count(state.total_comments),
            total_gifts: to_db_count(state.total_gifts),
            total_diamonds: to_db_count(state.total_diamonds),
            total_follows: to_db_count(state.total_follows),
            recent_comments: serde_json::to_string(&state.recent_comments)?,
            recent_gifts: serde_json::to_string(&state.recent_gifts)?,
            last_update: format_time(state.last_update),
            created_at: format_time(created_at),
        })
    }

    /// Convert the row back into a tracked account.
    pub fn into_tracked(self) -> Result<TrackedAccount> {
        let status = AccountStatus::parse(&self.status).ok_or_else(|| {
            Error::Other(format!(
                "unknown account status '{}' for {}",
                self.status, self.handle
            ))
        })?;

        let state = LiveState {
            is_live: self.is_live,
            viewer_count: from_db_count(self.viewer_count),
            total_comments: from_db_count(self.total_comments),
            total_gifts: from_db_count(self.total_gifts),
            total_diamonds: from_db_count(self.total_diamonds),
            total_follows: from_db_count(self.total_follows),
            recent_comments: serde_json::from_str(&self.recent_comments)?,
            recent_gifts: serde_json::from_str(&self.recent_gifts)?,
            last_update: parse_time(&self.last_update)?,
        };

        Ok(TrackedAccount {
            handle: Handle::from_trusted(self.handle),
            state,
            status,
            tracked_at: parse_time(&self.created_at)?,
        })
    }
}

fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid timestamp '{}': {}", value, e)))
}
