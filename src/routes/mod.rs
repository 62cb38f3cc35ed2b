pub mod auth;
pub mod comments;
pub mod likes;
pub mod posts;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::id::EntityId;
use crate::state::AppState;

/// The full HTTP surface with state applied.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    let mut router = Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(posts::router())
        .merge(likes::router())
        .merge(comments::router())
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors {
        router = router.layer(cors);
    }

    router.with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `None` when no origins are configured, so same-origin only.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

/// Path ids are parsed once here; anything malformed is a 400 with the
/// caller's message.
fn parse_id(raw: &str, message: &str) -> Result<EntityId, AppError> {
    EntityId::parse(raw).ok_or_else(|| AppError::Validation(message.to_string()))
}

/// The account behind a verified token; content is never created for a
/// user that no longer exists.
async fn require_account(state: &AppState, user: CurrentUser) -> AppResult<User> {
    state
        .users
        .find_by_id(&user.id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Trimmed, non-empty text or `None`.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_disabled_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
    }

    #[test]
    fn cors_enabled_with_valid_origin() {
        assert!(cors_layer(&["http://localhost:5173".to_string()]).is_some());
    }

    #[test]
    fn parse_id_rejects_garbage() {
        let err = parse_id("not-an-id", "Invalid post ID").unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "Invalid post ID"));

        let id = EntityId::generate();
        assert_eq!(parse_id(&id.to_string(), "x").unwrap(), id);
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  hi ".into())), Some("hi".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
