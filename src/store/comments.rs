use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::Comment;
use crate::id::EntityId;
use crate::state::DbPool;
use crate::store::pagination::Pagination;
use crate::store::StoreError;

/// Comments, plus the owning post's `comments_count`.
///
/// Ownership is enforced in the queries themselves: `update` and `delete`
/// only match rows whose author is the caller, so "missing" and "not yours"
/// look the same from outside.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Does not check that the post exists; callers do.
    async fn add(
        &self,
        post_id: EntityId,
        user_id: EntityId,
        content: &str,
    ) -> Result<Comment, StoreError>;

    /// Newest first.
    async fn list(
        &self,
        post_id: EntityId,
        pagination: Pagination,
    ) -> Result<(Vec<Comment>, i64), StoreError>;

    async fn update(
        &self,
        comment_id: EntityId,
        user_id: EntityId,
        content: &str,
    ) -> Result<Option<Comment>, StoreError>;

    async fn delete(&self, comment_id: EntityId, user_id: EntityId) -> Result<bool, StoreError>;
}

pub type DynCommentRepository = Arc<dyn CommentRepository>;

pub struct SqliteCommentRepository {
    pool: DbPool,
}

const COMMENT_COLUMNS: &str = "id, post_id, user_id, content, created_at, updated_at";

fn require_content(content: &str) -> Result<(), StoreError> {
    if content.trim().is_empty() {
        return Err(StoreError::Validation("Content is required".into()));
    }
    Ok(())
}

impl SqliteCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get(0)?,
            post_id: row.get(1)?,
            user_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn load(conn: &Connection, id: EntityId) -> Result<Option<Comment>, StoreError> {
        let comment = conn
            .query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
                params![id],
                Self::row_to_comment,
            )
            .optional()?;
        Ok(comment)
    }
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn add(
        &self,
        post_id: EntityId,
        user_id: EntityId,
        content: &str,
    ) -> Result<Comment, StoreError> {
        require_content(content)?;

        let mut conn = self.pool.get()?;
        let now = Utc::now();
        let comment = Comment {
            id: EntityId::generate(),
            post_id,
            user_id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO comments (id, post_id, user_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id,
                comment.post_id,
                comment.user_id,
                comment.content,
                comment.created_at,
                comment.updated_at
            ],
        )?;
        tx.execute(
            "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?1",
            params![post_id],
        )?;
        tx.commit()?;

        tracing::info!(comment_id = %comment.id, post_id = %post_id, "comment added");
        Ok(comment)
    }

    async fn list(
        &self,
        post_id: EntityId,
        pagination: Pagination,
    ) -> Result<(Vec<Comment>, i64), StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE post_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let comments = stmt
            .query_map(
                params![post_id, pagination.limit, pagination.offset()],
                Self::row_to_comment,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;

        Ok((comments, total))
    }

    async fn update(
        &self,
        comment_id: EntityId,
        user_id: EntityId,
        content: &str,
    ) -> Result<Option<Comment>, StoreError> {
        require_content(content)?;

        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE comments SET content = ?3, updated_at = ?4
             WHERE id = ?1 AND user_id = ?2",
            params![comment_id, user_id, content, Utc::now()],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        tracing::info!(comment_id = %comment_id, "comment updated");
        Self::load(&conn, comment_id)
    }

    async fn delete(&self, comment_id: EntityId, user_id: EntityId) -> Result<bool, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let post_id: Option<EntityId> = tx
            .query_row(
                "SELECT post_id FROM comments WHERE id = ?1 AND user_id = ?2",
                params![comment_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(post_id) = post_id else {
            return Ok(false);
        };

        tx.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
        // Floor at zero so a drifted counter never goes negative.
        tx.execute(
            "UPDATE posts SET comments_count = MAX(comments_count - 1, 0) WHERE id = ?1",
            params![post_id],
        )?;
        tx.commit()?;

        tracing::info!(comment_id = %comment_id, post_id = %post_id, "comment deleted");
        Ok(true)
    }
}
