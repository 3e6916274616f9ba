//! Headless screen models.
//!
//! Each screen is form state plus one call into the controller or the auth provider. The
//! result is an [`Outcome`]: an optional alert for the user and an optional navigation.

mod add_question;
mod home;
mod login;
mod signup;

pub use add_question::*;
pub use home::*;
pub use login::*;
pub use signup::*;

use crate::errors::AppError;

/// Navigable screens of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    Login,
    Signup,
    #[default]
    Home,
    AddQuestion,
}

/// Alert shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new("Success", message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new("Warning", message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new("Info", message)
    }
}

impl From<&AppError> for Notice {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::AuthRequired(msg) => Notice::new("Sign in required", msg.clone()),
            other => Notice::error(other.message()),
        }
    }
}

/// What a screen action asks the shell to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub notice: Option<Notice>,
    pub route: Option<Route>,
}

impl Outcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn notice(notice: Notice) -> Self {
        Self {
            notice: Some(notice),
            route: None,
        }
    }

    pub fn navigate(route: Route) -> Self {
        Self {
            notice: None,
            route: Some(route),
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    /// Alert for the error, routing to login when the error asks for a session.
    pub fn from_error(err: &AppError) -> Self {
        let outcome = Self::notice(Notice::from(err));
        if err.requires_login() {
            outcome.with_route(Route::Login)
        } else {
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_route_is_home() {
        assert_eq!(Route::default(), Route::Home);
    }

    #[test]
    fn test_auth_required_routes_to_login() {
        let outcome = Outcome::from_error(&AppError::AuthRequired("Sign in first".into()));
        assert_eq!(outcome.route, Some(Route::Login));
        assert_eq!(
            outcome.notice,
            Some(Notice::new("Sign in required", "Sign in first"))
        );
    }

    #[test]
    fn test_remote_error_stays_put() {
        let outcome = Outcome::from_error(&AppError::Remote("offline".into()));
        assert_eq!(outcome.route, None);
        assert_eq!(outcome.notice, Some(Notice::error("offline")));
    }
}
