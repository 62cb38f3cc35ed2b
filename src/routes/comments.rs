use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{Comment, CommentView};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, QueryParams};
use crate::routes::{non_blank, parse_id, require_account};
use crate::state::AppState;
use crate::store::pagination::{
    attach_authors, distinct_ids, Page, PageQuery, Pagination, COMMENTS_MAX_LIMIT,
};

const COMMENTS_DEFAULT_LIMIT: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route("/comments/{id}", put(update_comment).delete(delete_comment))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: Option<String>,
}

fn require_comment_content(req: CommentRequest) -> AppResult<String> {
    non_blank(req.content)
        .ok_or_else(|| AppError::Validation("Comment content is required".into()))
}

async fn comment_views(state: &AppState, comments: Vec<Comment>) -> AppResult<Vec<CommentView>> {
    let authors = state
        .users
        .summaries(&distinct_ids(&comments, |c| c.user_id))
        .await?;

    Ok(attach_authors(
        comments,
        &authors,
        |c| c.user_id,
        |comment, author| CommentView { comment, author },
    ))
}

async fn single_view(state: &AppState, comment: Comment) -> AppResult<CommentView> {
    comment_views(state, vec![comment])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("comment view vanished".into()))
}

/// POST /posts/{id}/comments
async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let post_id = parse_id(&id, "Invalid post ID")?;
    let content = require_comment_content(req)?;

    if state.posts.get(post_id).await?.is_none() {
        return Err(AppError::NotFound("Post not found".into()));
    }
    require_account(&state, user).await?;

    let comment = state.comments.add(post_id, user.id, &content).await?;
    let view = single_view(&state, comment).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Comment added successfully", "comment": view })),
    ))
}

/// GET /posts/{id}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<Page<CommentView>>> {
    let post_id = parse_id(&id, "Invalid post ID")?;
    let pagination = Pagination::from_query(query, COMMENTS_DEFAULT_LIMIT, COMMENTS_MAX_LIMIT)?;

    let (comments, total) = state.comments.list(post_id, pagination).await?;
    let views = comment_views(&state, comments).await?;

    Ok(Json(Page::new(views, total, pagination)))
}

/// PUT /comments/{id}
async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let comment_id = parse_id(&id, "Invalid comment ID")?;
    let content = require_comment_content(req)?;

    let comment = state
        .comments
        .update(comment_id, user.id, &content)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Comment not found or you are not authorized to edit it".into())
        })?;
    let view = single_view(&state, comment).await?;

    Ok(Json(
        json!({ "message": "Comment updated successfully", "comment": view }),
    ))
}

/// DELETE /comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let comment_id = parse_id(&id, "Invalid comment ID")?;

    if !state.comments.delete(comment_id, user.id).await? {
        return Err(AppError::NotFound(
            "Comment not found or you are not authorized to delete it".into(),
        ));
    }

    Ok(Json(json!({ "message": "Comment deleted successfully" })))
}
