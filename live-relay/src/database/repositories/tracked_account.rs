//! Tracked account repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::TrackedAccountDbModel;
use crate::domain::{Handle, TrackedAccount};

/// Durable store contract for tracked accounts.
#[async_trait]
pub trait LiveStateRepository: Send + Sync {
    /// Insert or update an account; keeps the original tracking time.
    async fn save(&self, account: &TrackedAccount) -> Result<()>;
    /// Delete an account. Deleting an absent account is not an error.
    async fn delete(&self, handle: &Handle) -> Result<()>;
    /// Load every tracked account in original tracking order.
    async fn load_tracked(&self) -> Result<Vec<TrackedAccount>>;
}

/// SQLx implementation of LiveStateRepository.
pub struct SqlxLiveStateRepository {
    pool: SqlitePool,
}

impl SqlxLiveStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LiveStateRepository for SqlxLiveStateRepository {
    async fn save(&self, account: &TrackedAccount) -> Result<()> {
        let model = TrackedAccountDbModel::from_state(
            &account.handle,
            &account.state,
            account.status,
            account.tracked_at,
        )?;

        sqlx::query(
            r#"
            INSERT INTO tracked_accounts (
                handle, status, is_live, viewer_count,
                total_comments, total_gifts, total_diamonds, total_follows,
                recent_comments, recent_gifts, last_update, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET
                status = excluded.status,
                is_live = excluded.is_live,
                viewer_count = excluded.viewer_count,
                total_comments = excluded.total_comments,
                total_gifts = excluded.total_gifts,
                total_diamonds = excluded.total_diamonds,
                total_follows = excluded.total_follows,
                recent_comments = excluded.recent_comments,
                recent_gifts = excluded.recent_gifts,
                last_update = excluded.last_update
            "#,
        )
        .bind(&model.handle)
        .bind(&model.status)
        .bind(model.is_live)
        .bind(model.viewer_count)
        .bind(model.total_comments)
        .bind(model.total_gifts)
        .bind(model.total_diamonds)
        .bind(model.total_follows)
        .bind(&model.recent_comments)
        .bind(&model.recent_gifts)
        .bind(&model.last_update)
        .bind(&model.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, handle: &Handle) -> Result<()> {
        sqlx::query("DELETE FROM tracked_accounts WHERE handle = ?")
            .bind(handle.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedAccount>> {
        let rows = sqlx::query_as::<_, TrackedAccountDbModel>(
            "SELECT * FROM tracked_accounts ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(TrackedAccountDbModel::into_tracked)
            .collect()
    }
}
