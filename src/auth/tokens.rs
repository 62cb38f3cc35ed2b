//! Stateless bearer tokens.
//!
//! A token is an HS256 JWT carrying only the user id. Nothing is stored
//! server-side, so there is no revocation: a token is good until it expires.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<EntityId> {
        EntityId::parse(&self.user_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is not configured")]
    SecretMissing,

    #[error("token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

pub struct TokenService {
    keys: Option<Keys>,
    validation: Validation,
    ttl_secs: i64,
}

impl TokenService {
    /// A missing or empty secret yields a service that cannot issue tokens
    /// and rejects every token it is shown.
    pub fn new(secret: Option<&str>, ttl_days: i64) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| Keys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });
        Self {
            keys,
            validation: Validation::default(),
            ttl_secs: ttl_days.saturating_mul(24 * 3600),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    pub fn issue(&self, user_id: EntityId) -> Result<String, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::SecretMissing)?;
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &keys.encoding,
        )?)
    }

    /// `None` for every failure. The reason is logged, never returned.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let keys = self.keys.as_ref()?;
        match jsonwebtoken::decode::<Claims>(token, &keys.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "token rejected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issue_and_verify() {
        let svc = TokenService::new(Some(SECRET), 7);
        let user = EntityId::generate();
        let token = svc.issue(user).unwrap();

        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.user_id(), Some(user));
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn wrong_secret_rejected() {
        let issuer = TokenService::new(Some("secret-a"), 7);
        let verifier = TokenService::new(Some("secret-b"), 7);
        let token = issuer.issue(EntityId::generate()).unwrap();
        assert!(verifier.verify(&token).is_none());
    }

    #[test]
    fn malformed_token_rejected() {
        let svc = TokenService::new(Some(SECRET), 7);
        assert!(svc.verify("invalid.token.here").is_none());
        assert!(svc.verify("").is_none());
    }

    #[test]
    fn expired_token_rejected() {
        // One day in the past is well beyond the default leeway.
        let svc = TokenService::new(Some(SECRET), -1);
        let token = svc.issue(EntityId::generate()).unwrap();
        assert!(svc.verify(&token).is_none());
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let svc = TokenService::new(Some(SECRET), i64::MAX);
        let token = svc.issue(EntityId::generate()).unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.exp, i64::MAX);
    }

    #[test]
    fn missing_secret_cannot_issue() {
        let svc = TokenService::new(None, 7);
        assert!(!svc.is_configured());
        assert!(matches!(
            svc.issue(EntityId::generate()),
            Err(TokenError::SecretMissing)
        ));

        let empty = TokenService::new(Some(""), 7);
        assert!(!empty.is_configured());
    }

    #[test]
    fn claims_use_user_id_key() {
        let svc = TokenService::new(Some(SECRET), 7);
        let token = svc.issue(EntityId::generate()).unwrap();
        let claims = svc.verify(&token).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("userId").is_some());
    }
}
