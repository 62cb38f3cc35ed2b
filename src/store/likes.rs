use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::db::models::{AuthorSummary, LikeStatus, LikeToggle};
use crate::id::EntityId;
use crate::state::DbPool;
use crate::store::pagination::Pagination;
use crate::store::{json_column, StoreError};

/// Like records plus the post's denormalized liker array.
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// Flip the caller's like. The returned count comes from the like
    /// records, not from the denormalized array.
    async fn toggle(&self, post_id: EntityId, user_id: EntityId)
        -> Result<LikeToggle, StoreError>;

    async fn status(
        &self,
        post_id: EntityId,
        user_id: Option<EntityId>,
    ) -> Result<LikeStatus, StoreError>;

    /// A page of liker ids in the order they appear on the post, with the
    /// array length as total.
    async fn likers(
        &self,
        post_id: EntityId,
        pagination: Pagination,
    ) -> Result<(Vec<EntityId>, i64), StoreError>;
}

pub type DynLikeRepository = Arc<dyn LikeRepository>;

/// Liker ids resolved to author summaries, in liker order.
pub fn order_likers(
    ids: &[EntityId],
    summaries: &std::collections::HashMap<EntityId, AuthorSummary>,
) -> Vec<AuthorSummary> {
    ids.iter().filter_map(|id| summaries.get(id).cloned()).collect()
}

pub struct SqliteLikeRepository {
    pool: DbPool,
}

impl SqliteLikeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LikeRepository for SqliteLikeRepository {
    async fn toggle(
        &self,
        post_id: EntityId,
        user_id: EntityId,
    ) -> Result<LikeToggle, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<EntityId> = tx
            .query_row(
                "SELECT id FROM likes WHERE post_id = ?1 AND user_id = ?2 LIMIT 1",
                params![post_id, user_id],
                |row| row.get(0),
            )
            .optional()?;

        let liked = match existing {
            Some(like_id) => {
                tx.execute("DELETE FROM likes WHERE id = ?1", params![like_id])?;
                tx.execute(
                    "UPDATE posts SET likes = (
                        SELECT COALESCE(json_group_array(value), '[]')
                        FROM json_each(posts.likes) WHERE value != ?2
                     )
                     WHERE id = ?1",
                    params![post_id, user_id],
                )?;
                false
            }
            None => {
                tx.execute(
                    "INSERT INTO likes (id, post_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![EntityId::generate(), post_id, user_id, Utc::now()],
                )?;
                // Add-to-set: skip when the id is already in the array.
                tx.execute(
                    "UPDATE posts SET likes = json_insert(likes, '$[#]', ?2)
                     WHERE id = ?1
                       AND NOT EXISTS (SELECT 1 FROM json_each(posts.likes) WHERE value = ?2)",
                    params![post_id, user_id],
                )?;
                true
            }
        };

        let like_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        tracing::info!(post_id = %post_id, user_id = %user_id, liked, like_count, "like toggled");
        Ok(LikeToggle { liked, like_count })
    }

    async fn status(
        &self,
        post_id: EntityId,
        user_id: Option<EntityId>,
    ) -> Result<LikeStatus, StoreError> {
        let conn = self.pool.get()?;

        let like_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;

        let user_liked = match user_id {
            Some(uid) => conn.query_row(
                "SELECT COUNT(*) > 0 FROM likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, uid],
                |row| row.get(0),
            )?,
            None => false,
        };

        Ok(LikeStatus {
            like_count,
            user_liked,
        })
    }

    async fn likers(
        &self,
        post_id: EntityId,
        pagination: Pagination,
    ) -> Result<(Vec<EntityId>, i64), StoreError> {
        let conn = self.pool.get()?;

        let likes: Option<Vec<EntityId>> = conn
            .query_row(
                "SELECT likes FROM posts WHERE id = ?1",
                params![post_id],
                |row| json_column(row, 0),
            )
            .optional()?;
        let likes = likes.unwrap_or_default();

        let total = likes.len() as i64;
        let page = likes
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok((page, total))
    }
}
