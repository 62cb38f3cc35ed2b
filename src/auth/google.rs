//! Google sign-in: consent URL and authorization-code exchange.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::GoogleConfig;
use crate::db::models::ExternalProfile;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid Google credentials")]
    InvalidProfile,
}

/// An external provider that turns an authorization code into a verified
/// profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start the flow.
    fn authorize_url(&self, state: &str) -> Result<String, IdentityError>;

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, IdentityError>;
}

pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

impl GoogleProvider {
    /// `None` unless both client id and secret are configured.
    pub fn from_config(config: &GoogleConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone()?,
            redirect_url: config.callback_url(),
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> Result<String, IdentityError> {
        let url = Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, IdentityError> {
        let token_resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
            ])
            .send()
            .await?;

        if !token_resp.status().is_success() {
            let status = token_resp.status().as_u16();
            let body = token_resp.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }
        let token: TokenResponse = token_resp.json().await?;

        let info_resp = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !info_resp.status().is_success() {
            let status = info_resp.status().as_u16();
            let body = info_resp.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }
        let info: UserInfo = info_resp.json().await?;

        profile_from_userinfo(info)
    }
}

fn profile_from_userinfo(info: UserInfo) -> Result<ExternalProfile, IdentityError> {
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or(IdentityError::InvalidProfile)?;
    if info.email_verified == Some(false) {
        return Err(IdentityError::InvalidProfile);
    }
    let name = info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Ok(ExternalProfile {
        subject: info.sub,
        name,
        email,
    })
}
