use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Post;
use crate::id::EntityId;
use crate::state::DbPool;
use crate::store::pagination::Pagination;
use crate::store::{json_column, StoreError};

/// Posts and their denormalized `likes` / `comments_count` fields.
///
/// Ownership is not checked here. Callers compare `post.user_id` with the
/// authenticated user before calling `update` or `delete`.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(
        &self,
        user_id: EntityId,
        content: &str,
        images: &[String],
    ) -> Result<Post, StoreError>;

    async fn get(&self, id: EntityId) -> Result<Option<Post>, StoreError>;

    /// Newest first; `author` narrows to one user's posts.
    async fn list(
        &self,
        pagination: Pagination,
        author: Option<EntityId>,
    ) -> Result<(Vec<Post>, i64), StoreError>;

    /// Only the supplied fields change. `None` when no post matched.
    async fn update(
        &self,
        id: EntityId,
        content: Option<&str>,
        images: Option<&[String]>,
    ) -> Result<Option<Post>, StoreError>;

    /// True if the post itself was deleted. Comments and likes are removed
    /// afterwards on a best-effort basis.
    async fn delete(&self, id: EntityId) -> Result<bool, StoreError>;

    /// Recompute `comments_count` and `likes` from the child tables.
    async fn reconcile(&self, id: EntityId) -> Result<Option<Post>, StoreError>;

    /// Reconcile every post; returns how many were corrected.
    async fn reconcile_all(&self) -> Result<usize, StoreError>;
}

pub type DynPostRepository = Arc<dyn PostRepository>;

pub struct SqlitePostRepository {
    pool: DbPool,
}

const POST_COLUMNS: &str =
    "id, user_id, content, images, likes, comments_count, created_at, updated_at";

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
        Ok(Post {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            images: json_column(row, 3)?,
            likes: json_column(row, 4)?,
            comments_count: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn load(conn: &Connection, id: EntityId) -> Result<Option<Post>, StoreError> {
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                Self::row_to_post,
            )
            .optional()?;
        Ok(post)
    }

    /// Returns true when either denormalized field had drifted.
    fn reconcile_one(conn: &Connection, id: EntityId) -> Result<bool, StoreError> {
        let changed = conn.execute(
            "UPDATE posts SET
                comments_count = (SELECT COUNT(*) FROM comments WHERE post_id = posts.id),
                likes = (
                    SELECT COALESCE(json_group_array(user_id), '[]') FROM (
                        SELECT user_id, MIN(created_at) AS first_liked
                        FROM likes WHERE post_id = posts.id
                        GROUP BY user_id
                        ORDER BY first_liked
                    )
                )
             WHERE id = ?1
               AND (
                 comments_count != (SELECT COUNT(*) FROM comments WHERE post_id = posts.id)
                 OR likes != (
                    SELECT COALESCE(json_group_array(user_id), '[]') FROM (
                        SELECT user_id, MIN(created_at) AS first_liked
                        FROM likes WHERE post_id = posts.id
                        GROUP BY user_id
                        ORDER BY first_liked
                    )
                 )
               )",
            params![id],
        )?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(
        &self,
        user_id: EntityId,
        content: &str,
        images: &[String],
    ) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;
        let now = Utc::now();
        let post = Post {
            id: EntityId::generate(),
            user_id,
            content: content.to_string(),
            images: images.to_vec(),
            likes: Vec::new(),
            comments_count: 0,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO posts (id, user_id, content, images, likes, comments_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '[]', 0, ?5, ?6)",
            params![
                post.id,
                post.user_id,
                post.content,
                serde_json::to_string(&post.images)?,
                post.created_at,
                post.updated_at
            ],
        )?;

        tracing::info!(post_id = %post.id, user_id = %user_id, "post created");
        Ok(post)
    }

    async fn get(&self, id: EntityId) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;
        Self::load(&conn, id)
    }

    async fn list(
        &self,
        pagination: Pagination,
        author: Option<EntityId>,
    ) -> Result<(Vec<Post>, i64), StoreError> {
        let conn = self.pool.get()?;

        // ?1 IS NULL keeps one statement for both the feed and a user filter.
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE ?1 IS NULL OR user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let posts = stmt
            .query_map(
                params![author, pagination.limit, pagination.offset()],
                Self::row_to_post,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE ?1 IS NULL OR user_id = ?1",
            params![author],
            |row| row.get(0),
        )?;

        Ok((posts, total))
    }

    async fn update(
        &self,
        id: EntityId,
        content: Option<&str>,
        images: Option<&[String]>,
    ) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;
        let images_json = images.map(serde_json::to_string).transpose()?;

        let changed = conn.execute(
            "UPDATE posts SET
                content = COALESCE(?2, content),
                images = COALESCE(?3, images),
                updated_at = ?4
             WHERE id = ?1",
            params![id, content, images_json, Utc::now()],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        tracing::info!(post_id = %id, "post updated");
        Self::load(&conn, id)
    }

    async fn delete(&self, id: EntityId) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Ok(false);
        }

        // Best-effort cascade. A failure leaves orphans but the post is gone.
        match conn.execute("DELETE FROM comments WHERE post_id = ?1", params![id]) {
            Ok(n) => tracing::debug!(post_id = %id, comments = n, "cascade removed comments"),
            Err(e) => tracing::warn!(post_id = %id, error = %e, "comment cascade failed"),
        }
        match conn.execute("DELETE FROM likes WHERE post_id = ?1", params![id]) {
            Ok(n) => tracing::debug!(post_id = %id, likes = n, "cascade removed likes"),
            Err(e) => tracing::warn!(post_id = %id, error = %e, "like cascade failed"),
        }

        tracing::info!(post_id = %id, "post deleted");
        Ok(true)
    }

    async fn reconcile(&self, id: EntityId) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;
        if Self::reconcile_one(&conn, id)? {
            tracing::info!(post_id = %id, "post counters reconciled");
        }
        Self::load(&conn, id)
    }

    async fn reconcile_all(&self) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let ids: Vec<EntityId> = {
            let mut stmt = conn.prepare("SELECT id FROM posts")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut corrected = 0;
        for id in ids {
            if Self::reconcile_one(&conn, id)? {
                corrected += 1;
            }
        }
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::pagination::POSTS_MAX_LIMIT;
    use crate::store::test_support::{count, seed_user, test_pool};
    use tempfile::TempDir;

    fn create_test_repo() -> (SqlitePostRepository, TempDir) {
        let (pool, temp) = test_pool();
        (SqlitePostRepository::new(pool), temp)
    }

    fn page(page: i64, limit: i64) -> Pagination {
        Pagination::new(page, limit, POSTS_MAX_LIMIT).unwrap()
    }

    #[tokio::test]
    async fn create_initializes_engagement() {
        let (repo, _temp) = create_test_repo();
        let user = seed_user(&repo.pool, "Ada");

        let post = repo
            .create(user, "hello", &["a.png".to_string()])
            .await
            .unwrap();
        assert!(post.likes.is_empty());
        assert_eq!(post.comments_count, 0);

        let loaded = repo.get(post.id).await.unwrap().unwrap();
        assert_eq!(loaded, post);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (repo, _temp) = create_test_repo();
        assert!(repo.get(EntityId::generate()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_stable() {
        let (repo, _temp) = create_test_repo();
        let user = seed_user(&repo.pool, "Ada");

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(repo.create(user, &format!("p{i}"), &[]).await.unwrap().id);
        }
        ids.reverse();

        let (first, total) = repo.list(page(1, 3), None).await.unwrap();
        let (second, _) = repo.list(page(2, 3), None).await.unwrap();
        assert_eq!(total, 5);

        let seen: Vec<EntityId> = first.iter().chain(second.iter()).map(|p| p.id).collect();
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn list_filters_by_author() {
        let (repo, _temp) = create_test_repo();
        let ada = seed_user(&repo.pool, "Ada");
        let bob = seed_user(&repo.pool, "Bob");

        repo.create(ada, "a1", &[]).await.unwrap();
        repo.create(bob, "b1", &[]).await.unwrap();
        repo.create(ada, "a2", &[]).await.unwrap();

        let (posts, total) = repo.list(page(1, 10), Some(ada)).await.unwrap();
        assert_eq!(total, 2);
        assert!(posts.iter().all(|p| p.user_id == ada));
    }

    #[tokio::test]
    async fn update_changes_only_supplied_fields() {
        let (repo, _temp) = create_test_repo();
        let user = seed_user(&repo.pool, "Ada");
        let post = repo
            .create(user, "before", &["keep.png".to_string()])
            .await
            .unwrap();

        let updated = repo
            .update(post.id, Some("after"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "after");
        assert_eq!(updated.images, vec!["keep.png".to_string()]);
        assert!(updated.updated_at >= post.updated_at);
        assert_eq!(updated.created_at, post.created_at);

        let images = vec!["new.png".to_string()];
        let updated = repo
            .update(post.id, None, Some(&images))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "after");
        assert_eq!(updated.images, images);
    }

    #[tokio::test]
    async fn update_missing_is_none() {
        let (repo, _temp) = create_test_repo();
        let result = repo
            .update(EntityId::generate(), Some("x"), None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let (repo, _temp) = create_test_repo();
        let user = seed_user(&repo.pool, "Ada");
        let post = repo.create(user, "doomed", &[]).await.unwrap();
        let other = repo.create(user, "survivor", &[]).await.unwrap();

        {
            let conn = repo.pool.get().unwrap();
            for target in [post.id, post.id, other.id] {
                conn.execute(
                    "INSERT INTO comments (id, post_id, user_id, content, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'c', ?4, ?4)",
                    params![EntityId::generate(), target, user, Utc::now()],
                )
                .unwrap();
                conn.execute(
                    "INSERT INTO likes (id, post_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![EntityId::generate(), target, EntityId::generate(), Utc::now()],
                )
                .unwrap();
            }
        }

        assert!(repo.delete(post.id).await.unwrap());
        assert!(repo.get(post.id).await.unwrap().is_none());

        let comments_sql = "SELECT COUNT(*) FROM comments WHERE post_id = ?1";
        let likes_sql = "SELECT COUNT(*) FROM likes WHERE post_id = ?1";
        assert_eq!(count(&repo.pool, comments_sql, post.id), 0);
        assert_eq!(count(&repo.pool, likes_sql, post.id), 0);
        assert_eq!(count(&repo.pool, comments_sql, other.id), 1);
        assert_eq!(count(&repo.pool, likes_sql, other.id), 1);

        // Second delete finds nothing.
        assert!(!repo.delete(post.id).await.unwrap());
    }

    #[tokio::test]
    async fn reconcile_repairs_drift() {
        let (repo, _temp) = create_test_repo();
        let user = seed_user(&repo.pool, "Ada");
        let liker = seed_user(&repo.pool, "Bob");
        let post = repo.create(user, "drifty", &[]).await.unwrap();

        {
            let conn = repo.pool.get().unwrap();
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'c', ?4, ?4)",
                params![EntityId::generate(), post.id, user, Utc::now()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO likes (id, post_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![EntityId::generate(), post.id, liker, Utc::now()],
            )
            .unwrap();
            // Counter claims five comments and a like from nobody.
            conn.execute(
                "UPDATE posts SET comments_count = 5, likes = ?2 WHERE id = ?1",
                params![
                    post.id,
                    serde_json::to_string(&[EntityId::generate()]).unwrap()
                ],
            )
            .unwrap();
        }

        let fixed = repo.reconcile(post.id).await.unwrap().unwrap();
        assert_eq!(fixed.comments_count, 1);
        assert_eq!(fixed.likes, vec![liker]);

        // Already consistent: nothing to correct.
        assert_eq!(repo.reconcile_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconcile_all_counts_corrections() {
        let (repo, _temp) = create_test_repo();
        let user = seed_user(&repo.pool, "Ada");
        let a = repo.create(user, "a", &[]).await.unwrap();
        repo.create(user, "b", &[]).await.unwrap();

        repo.pool
            .get()
            .unwrap()
            .execute(
                "UPDATE posts SET comments_count = 3 WHERE id = ?1",
                params![a.id],
            )
            .unwrap();

        assert_eq!(repo.reconcile_all().await.unwrap(), 1);
        assert_eq!(repo.get(a.id).await.unwrap().unwrap().comments_count, 0);
    }
}
