use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::auth::password::PasswordHasher;
use crate::db::models::{AuthorSummary, User};
use crate::id::EntityId;
use crate::state::DbPool;
use crate::store::StoreError;

/// User directory. Nothing returned from here carries a password hash.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `DuplicateEmail` when a prior read finds the address.
    async fn create_user(&self, name: &str, email: &str, password: &str)
        -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Accepts any string. Ids that are not valid `EntityId`s are looked up
    /// as Google subject ids instead.
    async fn find_by_id(&self, raw: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_external_id(&self, google_id: &str) -> Result<Option<User>, StoreError>;

    /// Attach a Google subject id to the account owning `email`.
    async fn link_external_id(&self, email: &str, google_id: &str) -> Result<(), StoreError>;

    /// A user with no password, only reachable through Google sign-in.
    async fn create_external_user(
        &self,
        name: &str,
        email: &str,
        google_id: &str,
    ) -> Result<User, StoreError>;

    /// `Some(user)` only when the account has a password and it matches.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError>;

    /// One query for any number of ids. Unknown ids are simply absent.
    async fn summaries(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, AuthorSummary>, StoreError>;
}

pub type DynUserRepository = Arc<dyn UserRepository>;

pub struct SqliteUserRepository {
    pool: DbPool,
    hasher: PasswordHasher,
}

const USER_COLUMNS: &str = "id, name, email, google_id, created_at, updated_at";

impl SqliteUserRepository {
    pub fn new(pool: DbPool, hasher: PasswordHasher) -> Self {
        Self { pool, hasher }
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            google_id: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1 LIMIT 1"),
                params![value],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn insert(
        &self,
        name: &str,
        email: &str,
        password_hash: Option<&str>,
        google_id: Option<&str>,
    ) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        let now = Utc::now();
        let user = User {
            id: EntityId::generate(),
            name: name.to_string(),
            email: email.to_string(),
            google_id: google_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, google_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.name,
                user.email,
                password_hash,
                user.google_id,
                user.created_at,
                user.updated_at
            ],
        )?;

        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        if self.find_one("email", email)?.is_some() {
            return Err(StoreError::DuplicateEmail);
        }

        let hash = self.hasher.hash(password)?;
        let user = self.insert(name, email, Some(&hash), None)?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email)
    }

    async fn find_by_id(&self, raw: &str) -> Result<Option<User>, StoreError> {
        match EntityId::parse(raw) {
            Some(id) => self.find_one("id", &id.to_string()),
            None => {
                tracing::debug!("id {:?} is not an entity id, trying google_id", raw);
                self.find_one("google_id", raw)
            }
        }
    }

    async fn find_by_external_id(&self, google_id: &str) -> Result<Option<User>, StoreError> {
        self.find_one("google_id", google_id)
    }

    async fn link_external_id(&self, email: &str, google_id: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET google_id = ?1, updated_at = ?2 WHERE email = ?3",
            params![google_id, Utc::now(), email],
        )?;
        Ok(())
    }

    async fn create_external_user(
        &self,
        name: &str,
        email: &str,
        google_id: &str,
    ) -> Result<User, StoreError> {
        let user = self.insert(name, email, None, Some(google_id))?;
        tracing::info!(user_id = %user.id, "user created from google sign-in");
        Ok(user)
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let found: Option<(User, Option<String>)> = conn
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1 LIMIT 1"
                ),
                params![email],
                |row| Ok((Self::row_to_user(row)?, row.get(6)?)),
            )
            .optional()?;

        Ok(match found {
            Some((user, Some(hash))) if self.hasher.verify(password, &hash) => Some(user),
            _ => None,
        })
    }

    async fn summaries(
        &self,
        ids: &[EntityId],
    ) -> Result<HashMap<EntityId, AuthorSummary>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.pool.get()?;
        let ids_json = serde_json::to_string(ids)?;
        let mut stmt = conn.prepare(
            "SELECT id, name, email FROM users
             WHERE id IN (SELECT value FROM json_each(?1))",
        )?;
        let summaries = stmt
            .query_map(params![ids_json], |row| {
                Ok(AuthorSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries.into_iter().map(|s| (s.id, s)).collect())
    }
}
