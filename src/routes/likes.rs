use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::{AuthorSummary, LikeStatus};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser, QueryParams};
use crate::routes::parse_id;
use crate::state::AppState;
use crate::store::likes::order_likers;
use crate::store::pagination::{Page, PageQuery, Pagination, LIKERS_MAX_LIMIT};

const LIKERS_DEFAULT_LIMIT: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/like", get(like_status).post(toggle_like))
        .route("/posts/{id}/likes", get(list_likers))
}

/// POST /posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let post_id = parse_id(&id, "Invalid post ID")?;
    if state.posts.get(post_id).await?.is_none() {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let result = state.likes.toggle(post_id, user.id).await?;
    let message = if result.liked {
        "Post liked successfully"
    } else {
        "Post unliked successfully"
    };

    Ok(Json(json!({
        "message": message,
        "liked": result.liked,
        "likeCount": result.like_count,
    })))
}

/// GET /posts/{id}/like
async fn like_status(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeStatus>> {
    let post_id = parse_id(&id, "Invalid post ID")?;
    let status = state.likes.status(post_id, viewer.id()).await?;
    Ok(Json(status))
}

/// GET /posts/{id}/likes
async fn list_likers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<Page<AuthorSummary>>> {
    let post_id = parse_id(&id, "Invalid post ID")?;
    let pagination = Pagination::from_query(query, LIKERS_DEFAULT_LIMIT, LIKERS_MAX_LIMIT)?;

    let (ids, total) = state.likes.likers(post_id, pagination).await?;
    let summaries = state.users.summaries(&ids).await?;

    Ok(Json(Page::new(
        order_likers(&ids, &summaries),
        total,
        pagination,
    )))
}
