//! Authentication and session management.
//!
//! The synchronization layer never looks the current user up on its own; callers pass
//! the [`Session`] they hold into every operation that needs an identity.

mod local;
mod password;

pub use local::*;
pub use password::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Session {
    /// Username if known, otherwise `user_` and the start of the user ID.
    pub fn display_name(&self) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("user_{}", prefix(&self.user_id, 6)),
        }
    }
}

/// Up to `len` leading characters of `s`.
pub fn prefix(s: &str, len: usize) -> String {
    s.chars().take(len).collect()
}

/// Account operations the client needs from an identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Create an account. The new user is not signed in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AppError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// Start a password reset. Unknown emails succeed silently.
    async fn request_password_reset(&self, email: &str) -> Result<(), AppError>;

    fn current_session(&self) -> Option<Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback() {
        let mut session = Session {
            user_id: "0123456789abcdef".to_string(),
            email: "a@example.com".to_string(),
            username: None,
        };
        assert_eq!(session.display_name(), "user_012345");

        session.username = Some("  ".to_string());
        assert_eq!(session.display_name(), "user_012345");

        session.username = Some("alice".to_string());
        assert_eq!(session.display_name(), "alice");
    }

    #[test]
    fn test_prefix_handles_short_and_multibyte() {
        assert_eq!(prefix("abc", 6), "abc");
        assert_eq!(prefix("éèêëàâ-rest", 3), "éèê");
    }
}
