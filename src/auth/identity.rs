use crate::db::models::{ExternalProfile, User};
use crate::store::users::UserRepository;
use crate::store::StoreError;

/// Map a verified Google profile to a local user.
///
/// Lookup order is Google id, then email (linking the Google id onto that
/// account), then a fresh passwordless user. The branches are not
/// transactional; a failed create after two misses surfaces as-is.
pub async fn resolve_external_identity(
    users: &dyn UserRepository,
    profile: &ExternalProfile,
) -> Result<User, StoreError> {
    if let Some(user) = users.find_by_external_id(&profile.subject).await? {
        return Ok(user);
    }

    if users.find_by_email(&profile.email).await?.is_some() {
        tracing::info!("linking google identity to existing account");
        users
            .link_external_id(&profile.email, &profile.subject)
            .await?;
        if let Some(user) = users.find_by_email(&profile.email).await? {
            return Ok(user);
        }
    }

    users
        .create_external_user(&profile.name, &profile.email, &profile.subject)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordHasher;
    use crate::store::test_support::test_pool;
    use crate::store::users::SqliteUserRepository;

    fn profile(subject: &str, email: &str) -> ExternalProfile {
        ExternalProfile {
            subject: subject.to_string(),
            name: "Grace".to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn creates_new_user_without_password() {
        let (pool, _temp) = test_pool();
        let repo = SqliteUserRepository::new(pool, PasswordHasher::new(4 /* bcrypt minimum cost */));

        let user = resolve_external_identity(&repo, &profile("g-1", "grace@example.com"))
            .await
            .unwrap();
        assert_eq!(user.google_id.as_deref(), Some("g-1"));
        assert!(repo
            .verify_credentials("grace@example.com", "")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn returns_same_user_on_repeat_login() {
        let (pool, _temp) = test_pool();
        let repo = SqliteUserRepository::new(pool, PasswordHasher::new(4 /* bcrypt minimum cost */));

        let first = resolve_external_identity(&repo, &profile("g-1", "grace@example.com"))
            .await
            .unwrap();
        let second = resolve_external_identity(&repo, &profile("g-1", "grace@example.com"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn links_existing_email_account() {
        let (pool, _temp) = test_pool();
        let repo = SqliteUserRepository::new(pool, PasswordHasher::new(4 /* bcrypt minimum cost */));
        let existing = repo
            .create_user("Grace", "grace@example.com", "pw")
            .await
            .unwrap();

        let user = resolve_external_identity(&repo, &profile("g-9", "grace@example.com"))
            .await
            .unwrap();
        assert_eq!(user.id, existing.id);
        assert_eq!(user.google_id.as_deref(), Some("g-9"));

        // Password login keeps working after linking.
        assert!(repo
            .verify_credentials("grace@example.com", "pw")
            .await
            .unwrap()
            .is_some());
    }
}
