use std::sync::Arc;

use tracing::{info, warn};

use super::{Notice, Outcome, Route};
use crate::auth::{prefix, AuthProvider, Session};
use crate::gateway::{Collection, Gateway};
use crate::models::NewProfile;

/// Account creation form.
///
/// Besides the account itself, a profile row is created so the new user's posts carry a
/// username from the start.
pub struct SignupScreen<G: Gateway, A: AuthProvider> {
    gateway: Arc<G>,
    auth: Arc<A>,
    pub email: String,
    pub password: String,
    loading: bool,
}

impl<G: Gateway, A: AuthProvider> SignupScreen<G, A> {
    pub fn new(gateway: Arc<G>, auth: Arc<A>) -> Self {
        Self {
            gateway,
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
        let outcome = self.create_account().await;
        self.loading = false;
        outcome
    }

    async fn create_account(&mut self) -> Outcome {
        let session = match self.auth.sign_up(&self.email, &self.password).await {
            Ok(session) => session,
            Err(e) => return Outcome::from_error(&e),
        };
        info!(user_id = %session.user_id, "Account created from signup screen");
        self.password.clear();

        let profile = NewProfile {
            id: session.user_id.clone(),
            username: initial_username(&session),
            email: Some(session.email.clone()),
        };
        let inserted = match serde_json::to_value(&profile) {
            Ok(payload) => self.gateway.insert(Collection::Profiles, payload).await,
            Err(e) => Err(e.into()),
        };

        match inserted {
            Ok(_) => Outcome::notice(Notice::success(
                "Account created. You can now sign in.",
            ))
            .with_route(Route::Login),
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "Profile creation failed");
                Outcome::notice(Notice::warning(
                    "Account created, but the profile could not be saved.",
                ))
                .with_route(Route::Login)
            }
        }
    }

    pub fn go_to_login(&self) -> Outcome {
        Outcome::navigate(Route::Login)
    }
}

/// Local part of the email, or `user_` and the start of the user ID.
pub fn initial_username(session: &Session) -> String {
    match session.email.split('@').next().map(str::trim) {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => format!("user_{}", prefix(&session.user_id, 8)),
    }
}
