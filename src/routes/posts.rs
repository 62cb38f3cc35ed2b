use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{Post, PostView};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, MaybeUser, QueryParams};
use crate::id::EntityId;
use crate::routes::{non_blank, parse_id, require_account};
use crate::state::AppState;
use crate::store::pagination::{
    attach_authors, distinct_ids, empty_as_none, Page, PageQuery, Pagination, POSTS_MAX_LIMIT,
};

const POSTS_DEFAULT_LIMIT: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/user", get(my_posts))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(default, alias = "caption")]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default, alias = "caption")]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<i64>,
    #[serde(alias = "userId")]
    pub author_id: Option<String>,
}

/// Attach author summaries (one batched lookup) and the viewer's like state.
pub(crate) async fn post_views(
    state: &AppState,
    posts: Vec<Post>,
    viewer: Option<EntityId>,
) -> AppResult<Vec<PostView>> {
    let authors = state
        .users
        .summaries(&distinct_ids(&posts, |p| p.user_id))
        .await?;

    Ok(attach_authors(posts, &authors, |p| p.user_id, |post, author| {
        let user_liked = viewer.map(|v| post.likes.contains(&v));
        PostView {
            like_count: post.likes.len(),
            author,
            user_liked,
            post,
        }
    }))
}

async fn single_view(
    state: &AppState,
    post: Post,
    viewer: Option<EntityId>,
) -> AppResult<PostView> {
    post_views(state, vec![post], viewer)
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("post view vanished".into()))
}

async fn load_post(state: &AppState, id: EntityId) -> AppResult<Post> {
    state
        .posts
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))
}

/// POST /posts
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let content =
        non_blank(req.content).ok_or_else(|| AppError::Validation("Content is required".into()))?;
    require_account(&state, user).await?;

    let post = state.posts.create(user.id, &content, &req.images).await?;
    let view = single_view(&state, post, Some(user.id)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created successfully", "post": view })),
    ))
}

/// GET /posts
async fn list_posts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    QueryParams(query): QueryParams<ListPostsQuery>,
) -> AppResult<Json<Page<PostView>>> {
    let author = match query.author_id.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_id(raw, "Invalid user ID")?),
        None => None,
    };
    let pagination = Pagination::from_query(
        PageQuery {
            page: query.page,
            limit: query.limit,
        },
        POSTS_DEFAULT_LIMIT,
        POSTS_MAX_LIMIT,
    )?;

    page_of_posts(&state, pagination, author, viewer.id()).await
}

/// GET /posts/user
async fn my_posts(
    State(state): State<AppState>,
    user: CurrentUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<Page<PostView>>> {
    let pagination = Pagination::from_query(query, POSTS_DEFAULT_LIMIT, POSTS_MAX_LIMIT)?;
    page_of_posts(&state, pagination, Some(user.id), Some(user.id)).await
}

async fn page_of_posts(
    state: &AppState,
    pagination: Pagination,
    author: Option<EntityId>,
    viewer: Option<EntityId>,
) -> AppResult<Json<Page<PostView>>> {
    let (posts, total) = state.posts.list(pagination, author).await?;
    let views = post_views(state, posts, viewer).await?;
    Ok(Json(Page::new(views, total, pagination)))
}

/// GET /posts/{id}
async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "Invalid post ID")?;
    let post = load_post(&state, id).await?;
    let view = single_view(&state, post, viewer.id()).await?;
    Ok(Json(json!({ "post": view })))
}

/// PUT /posts/{id}
async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "Invalid post ID")?;

    let content = match req.content {
        Some(raw) => Some(
            non_blank(Some(raw))
                .ok_or_else(|| AppError::Validation("Content is required".into()))?,
        ),
        None => None,
    };
    if content.is_none() && req.images.is_none() {
        return Err(AppError::Validation("Nothing to update".into()));
    }

    let post = load_post(&state, id).await?;
    if post.user_id != user.id {
        return Err(AppError::Forbidden(
            "You do not have permission to update this post".into(),
        ));
    }

    let updated = state
        .posts
        .update(id, content.as_deref(), req.images.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
    let view = single_view(&state, updated, Some(user.id)).await?;

    Ok(Json(
        json!({ "message": "Post updated successfully", "post": view }),
    ))
}

/// DELETE /posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "Invalid post ID")?;

    let post = load_post(&state, id).await?;
    if post.user_id != user.id {
        return Err(AppError::Forbidden(
            "You do not have permission to delete this post".into(),
        ));
    }

    if !state.posts.delete(id).await? {
        return Err(AppError::NotFound("Post not found".into()));
    }

    Ok(Json(json!({ "message": "Post deleted successfully" })))
}
