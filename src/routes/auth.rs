use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::auth::identity::resolve_external_identity;
use crate::error::{AppError, AppResult};
use crate::extractors::{BearerClaims, JsonBody};
use crate::routes::non_blank;
use crate::state::AppState;

const OAUTH_STATE_COOKIE: &str = "postline_oauth_state";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/user", get(current_user))
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

fn missing_fields() -> AppError {
    AppError::Validation("Missing required fields".into())
}

/// Passwords are taken verbatim; only emptiness is checked.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// -- Cookie helpers --

fn state_cookie(value: &str) -> String {
    // Lax: the callback arrives as a top-level navigation from Google.
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/auth/google; Max-Age=600",
        OAUTH_STATE_COOKIE, value
    )
}

fn clear_state_cookie() -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/auth/google; Max-Age=0",
        OAUTH_STATE_COOKIE
    )
}

fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let (key, val) = cookie.split_once('=')?;
            (key.trim() == name).then(|| val.trim())
        })
}

fn new_oauth_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

// -- Password handlers --

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let name = non_blank(req.name).ok_or_else(missing_fields)?;
    let email = non_blank(req.email).ok_or_else(missing_fields)?;
    let password = present(req.password).ok_or_else(missing_fields)?;

    let user = state.users.create_user(&name, &email, &password).await?;
    let token = state.tokens.issue(user.id)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": user,
            "token": token,
        })),
    ))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let email = non_blank(req.email).ok_or_else(missing_fields)?;
    let password = present(req.password).ok_or_else(missing_fields)?;

    let user = state
        .users
        .verify_credentials(&email, &password)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    let token = state.tokens.issue(user.id)?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(json!({
        "message": "Login successful",
        "user": user,
        "token": token,
    })))
}

/// GET /auth/user
async fn current_user(
    State(state): State<AppState>,
    BearerClaims(claims): BearerClaims,
) -> AppResult<impl IntoResponse> {
    let user = state
        .users
        .find_by_id(&claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(json!({ "user": user })))
}

// -- Google sign-in --

/// GET /auth/google: redirect to the consent screen.
async fn google_start(State(state): State<AppState>) -> AppResult<Response> {
    let provider = state
        .identity
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".into()))?;

    let oauth_state = new_oauth_state();
    let url = provider
        .authorize_url(&oauth_state)
        .map_err(|e| AppError::Internal(format!("building consent url: {}", e)))?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, state_cookie(&oauth_state))]),
        Redirect::to(&url),
    )
        .into_response())
}

/// GET /auth/google/callback: always answers with a redirect to the client.
async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let public_url = state.config.google.public_url.trim_end_matches('/');

    let target = match finish_google_login(&state, &headers, query).await {
        Ok(token) => format!("{}/auth/callback?token={}", public_url, token),
        Err(code) => format!("{}/auth/login?error={}", public_url, code),
    };

    (
        AppendHeaders([(header::SET_COOKIE, clear_state_cookie())]),
        Redirect::to(&target),
    )
        .into_response()
}

/// `Err` carries the error code shown to the client.
async fn finish_google_login(
    state: &AppState,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> Result<String, &'static str> {
    let provider = state.identity.as_ref().ok_or("OAuthSignin")?;
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or("OAuthSignin")?;

    let expected = get_cookie_value(headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || expected != query.state.as_deref() {
        tracing::warn!("google callback state mismatch");
        return Err("OAuthCallback");
    }

    let profile = provider.exchange_code(&code).await.map_err(|e| {
        tracing::warn!(error = %e, "google code exchange failed");
        "OAuthCallback"
    })?;

    let user = resolve_external_identity(state.users.as_ref(), &profile)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "resolving google identity failed");
            "OAuthCallback"
        })?;

    state.tokens.issue(user.id).map_err(|e| {
        tracing::error!(error = %e, "issuing token after google login failed");
        "OAuthCallback"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_value_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; postline_oauth_state=abc; b=2"),
        );
        assert_eq!(get_cookie_value(&headers, OAUTH_STATE_COOKIE), Some("abc"));
        assert_eq!(get_cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn oauth_state_is_random_alphanumeric() {
        let a = new_oauth_state();
        let b = new_oauth_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn state_cookie_round_trips_through_header() {
        let cookie = state_cookie("xyz");
        assert!(cookie.starts_with("postline_oauth_state=xyz;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(clear_state_cookie().contains("Max-Age=0"));
    }
}
