//! Data access for the four collections.
//!
//! Each submodule exposes a repository trait plus its SQLite implementation,
//! following one rule: a store returns plain projections and never leaks
//! internal-only fields (the password hash stays inside `users`).

pub mod comments;
pub mod likes;
pub mod pagination;
pub mod posts;
pub mod users;

use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    DuplicateEmail,
}

/// Read a JSON-encoded TEXT column (`images`, `likes`).
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
