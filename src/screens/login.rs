use std::sync::Arc;

use tracing::info;

use super::{Notice, Outcome, Route};
use crate::auth::AuthProvider;

/// Email and password sign-in form.
pub struct LoginScreen<A: AuthProvider> {
    auth: Arc<A>,
    pub email: String,
    pub password: String,
    loading: bool,
}

impl<A: AuthProvider> LoginScreen<A> {
    pub fn new(auth: Arc<A>) -> Self {
        Self {
            auth,
            email: String::new(),
            password: String::new(),
            loading: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub async fn submit(&mut self) -> Outcome {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Outcome::notice(Notice::error("Please fill in every field."));
        }

        self.loading = true;
        let result = self.auth.sign_in(&self.email, &self.password).await;
        self.loading = false;

        match result {
            Ok(session) => {
                info!(user_id = %session.user_id, "Login screen signed in");
                self.password.clear();
                Outcome::navigate(Route::Home)
            }
            Err(e) => Outcome::from_error(&e),
        }
    }

    pub async fn forgot_password(&mut self) -> Outcome {
        if self.email.trim().is_empty() {
            return Outcome::notice(Notice::error("Enter your email first."));
        }

        match self.auth.request_password_reset(&self.email).await {
            Ok(()) => Outcome::notice(Notice::info(
                "If an account exists for this email, a reset link is on its way.",
            )),
            Err(e) => Outcome::from_error(&e),
        }
    }

    pub fn go_to_signup(&self) -> Outcome {
        Outcome::navigate(Route::Signup)
    }
}
