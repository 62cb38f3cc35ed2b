use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::db::models::AuthorSummary;
use crate::id::EntityId;
use crate::store::StoreError;

pub const POSTS_MAX_LIMIT: i64 = 50;
pub const COMMENTS_MAX_LIMIT: i64 = 50;
pub const LIKERS_MAX_LIMIT: i64 = 100;

/// Raw `?page=&limit=` query parameters. Empty values mean "use the default".
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<i64>,
}

/// Query-string field where a blank value reads as absent.
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// `page >= 1` and `1 <= limit <= max_limit`, anything else is rejected.
    pub fn new(page: i64, limit: i64, max_limit: i64) -> Result<Self, StoreError> {
        if page < 1 || limit < 1 || limit > max_limit {
            return Err(StoreError::Validation(
                "Invalid pagination parameters".into(),
            ));
        }
        Ok(Self { page, limit })
    }

    pub fn from_query(
        query: PageQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> Result<Self, StoreError> {
        Self::new(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(default_limit),
            max_limit,
        )
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Envelope returned by every listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            (total + pagination.limit - 1) / pagination.limit
        };
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages,
        }
    }
}

/// Distinct ids referenced by a page, for one batched author lookup.
pub fn distinct_ids<T>(items: &[T], id_of: impl Fn(&T) -> EntityId) -> Vec<EntityId> {
    items
        .iter()
        .map(id_of)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Attach author summaries to each item from a prefetched map.
pub fn attach_authors<T, U>(
    items: Vec<T>,
    authors: &HashMap<EntityId, AuthorSummary>,
    id_of: impl Fn(&T) -> EntityId,
    join: impl Fn(T, Option<AuthorSummary>) -> U,
) -> Vec<U> {
    items
        .into_iter()
        .map(|item| {
            let author = authors.get(&id_of(&item)).cloned();
            join(item, author)
        })
        .collect()
}
