//! Error handling module for the forum client.
//!
//! Provides the centralized error type returned by gateway, auth and controller operations.

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const REMOTE_CALL: &str = "REMOTE_CALL";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const CONFLICT: &str = "CONFLICT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// A gateway query, insert or subscribe failed
    Remote(String),
    /// A required field is empty; raised before any remote call
    Validation(String),
    /// The action needs a signed-in user
    AuthRequired(String),
    /// Credentials were rejected
    Unauthorized(String),
    /// The record already exists
    Conflict(String),
    /// Record not found
    NotFound(String),
    /// Internal error
    Internal(String),
}

impl AppError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Remote(_) => codes::REMOTE_CALL,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::AuthRequired(_) => codes::AUTH_REQUIRED,
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Conflict(_) => codes::CONFLICT,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Remote(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::AuthRequired(msg) => msg.clone(),
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
        }
    }

    /// Whether the user should be sent to the login flow.
    pub fn requires_login(&self) -> bool {
        matches!(self, AppError::AuthRequired(_))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Remote(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Remote(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = AppError::Validation("Title is required".to_string());
        assert_eq!(err.to_string(), "VALIDATION_ERROR: Title is required");
    }

    #[test]
    fn test_only_auth_required_routes_to_login() {
        assert!(AppError::AuthRequired("sign in".into()).requires_login());
        assert!(!AppError::Unauthorized("bad password".into()).requires_login());
        assert!(!AppError::Remote("offline".into()).requires_login());
    }

    #[test]
    fn test_json_error_maps_to_remote() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AppError = json_err.into();
        assert_eq!(err.error_code(), codes::REMOTE_CALL);
    }
}
