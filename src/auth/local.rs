//! SQLite-backed identity provider.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::SqlitePool;

use super::{constant_time_compare, hash_password, verify_password, AuthProvider, Session};
use crate::db::{Repository, UserRecord};
use crate::errors::AppError;
use crate::gateway::Collection;
use crate::models::Profile;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

const RESET_TOKEN_LEN: usize = 32;

/// Identity provider over the local database, holding one signed-in session.
pub struct LocalAuth {
    repo: Repository,
    current: RwLock<Option<Session>>,
    reset_ttl: Duration,
}

impl LocalAuth {
    pub fn new(pool: SqlitePool, reset_ttl_minutes: i64) -> Self {
        Self {
            repo: Repository::new(pool),
            current: RwLock::new(None),
            reset_ttl: Duration::minutes(reset_ttl_minutes),
        }
    }

    fn set_current(&self, session: Option<Session>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    async fn session_for(&self, user: &UserRecord) -> Result<Session, AppError> {
        let username = self
            .repo
            .fetch_row(Collection::Profiles, &user.id)
            .await?
            .and_then(|row| serde_json::from_value::<Profile>(row).ok())
            .map(|profile| profile.username);

        Ok(Session {
            user_id: user.id.clone(),
            email: user.email.clone(),
            username,
        })
    }

    /// Create and store a reset token for an account.
    ///
    /// Delivering the token to the user is up to the caller.
    pub async fn issue_reset_token(&self, email: &str) -> Result<String, AppError> {
        let email = normalize_email(email);
        if self.repo.find_user_by_email(&email).await?.is_none() {
            return Err(AppError::NotFound(format!("No account for {}", email)));
        }

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();

        self.repo
            .store_reset_token(&email, &token, Utc::now() + self.reset_ttl)
            .await?;

        tracing::info!(email = %email, "Password reset issued");
        Ok(token)
    }

    /// Set a new password using a token from [`issue_reset_token`](Self::issue_reset_token).
    ///
    /// The token is consumed whether or not it matches.
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        validate_password(new_password)?;
        let email = normalize_email(email);

        let invalid = || AppError::Unauthorized("Invalid or expired reset token".to_string());
        let (expected, expires_at) = self.repo.take_reset_token(&email).await?.ok_or_else(invalid)?;
        if expires_at < Utc::now() || !constant_time_compare(token, &expected) {
            return Err(invalid());
        }

        let user = self
            .repo
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No account for {}", email)))?;
        self.repo
            .update_password_hash(&user.id, &hash_password(new_password)?)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(AppError::Validation(format!("{} is not a valid email", email)));
        }
        validate_password(password)?;

        let user = self
            .repo
            .create_user(&email, &hash_password(password)?)
            .await?;

        tracing::info!(user_id = %user.id, "Account created");
        Ok(Session {
            user_id: user.id,
            email: user.email,
            username: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let email = normalize_email(email);
        let rejected = || AppError::Unauthorized("Invalid login credentials".to_string());

        let user = self
            .repo
            .find_user_by_email(&email)
            .await?
            .ok_or_else(rejected)?;
        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "Sign-in rejected");
            return Err(rejected());
        }

        let session = self.session_for(&user).await?;
        self.set_current(Some(session.clone()));
        tracing::info!(user_id = %session.user_id, "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.set_current(None);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        match self.issue_reset_token(email).await {
            Ok(_) | Err(AppError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn current_session(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn auth() -> (LocalAuth, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("auth.sqlite"))
            .await
            .unwrap();
        (LocalAuth::new(pool, 30), temp_dir)
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let (auth, _dir) = auth().await;

        let created = auth.sign_up(" Alice@Example.com ", "secret1").await.unwrap();
        assert_eq!(created.email, "alice@example.com");
        assert!(auth.current_session().is_none());

        let session = auth.sign_in("alice@example.com", "secret1").await.unwrap();
        assert_eq!(session.user_id, created.user_id);
        assert_eq!(auth.current_session(), Some(session));

        auth.sign_out().await.unwrap();
        assert!(auth.current_session().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_rejects_wrong_password_and_unknown_email() {
        let (auth, _dir) = auth().await;
        auth.sign_up("bob@example.com", "hunter22").await.unwrap();

        let wrong = auth.sign_in("bob@example.com", "hunter23").await.unwrap_err();
        let unknown = auth.sign_in("eve@example.com", "hunter22").await.unwrap_err();
        assert!(matches!(wrong, AppError::Unauthorized(_)));
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn test_sign_up_validation_and_conflict() {
        let (auth, _dir) = auth().await;

        assert!(matches!(
            auth.sign_up("not-an-email", "secret1").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            auth.sign_up("c@example.com", "123").await,
            Err(AppError::Validation(_))
        ));

        auth.sign_up("c@example.com", "secret1").await.unwrap();
        assert!(matches!(
            auth.sign_up("C@example.com", "secret1").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (auth, _dir) = auth().await;
        auth.sign_up("d@example.com", "old-password").await.unwrap();

        let token = auth.issue_reset_token("d@example.com").await.unwrap();
        assert_eq!(token.len(), RESET_TOKEN_LEN);

        auth.confirm_password_reset("d@example.com", &token, "new-password")
            .await
            .unwrap();

        assert!(auth.sign_in("d@example.com", "old-password").await.is_err());
        assert!(auth.sign_in("d@example.com", "new-password").await.is_ok());

        // Tokens are single use
        let reused = auth
            .confirm_password_reset("d@example.com", &token, "another-one")
            .await
            .unwrap_err();
        assert!(matches!(reused, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_wrong_reset_token_is_rejected() {
        let (auth, _dir) = auth().await;
        auth.sign_up("e@example.com", "old-password").await.unwrap();
        auth.issue_reset_token("e@example.com").await.unwrap();

        let err = auth
            .confirm_password_reset("e@example.com", "guess", "new-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(auth.sign_in("e@example.com", "old-password").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_request_for_unknown_email_succeeds() {
        let (auth, _dir) = auth().await;
        auth.request_password_reset("nobody@example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_picks_up_profile_username() {
        let (auth, _dir) = auth().await;
        let created = auth.sign_up("f@example.com", "secret1").await.unwrap();
        auth.repo
            .insert_row(
                Collection::Profiles,
                &serde_json::json!({ "id": created.user_id, "username": "frank" }),
            )
            .await
            .unwrap();

        let session = auth.sign_in("f@example.com", "secret1").await.unwrap();
        assert_eq!(session.username.as_deref(), Some("frank"));
    }
}
