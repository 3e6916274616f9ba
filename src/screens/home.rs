use std::sync::Arc;

use tracing::debug;

use super::{Notice, Outcome, Route};
use crate::auth::AuthProvider;
use crate::errors::AppError;
use crate::gateway::Gateway;
use crate::models::{Question, Response};
use crate::sync::{LiveSync, SubscriptionState, SyncController};

/// Reply being written under a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyDraft {
    pub question_id: String,
    pub body: String,
}

/// Question feed with expandable replies and an inline reply box.
pub struct HomeScreen<G: Gateway, A: AuthProvider> {
    live: LiveSync<G>,
    auth: Arc<A>,
    reply: Option<ReplyDraft>,
}

impl<G: Gateway, A: AuthProvider> HomeScreen<G, A> {
    /// Start live sync and load the feed.
    pub async fn mount(controller: Arc<SyncController<G>>, auth: Arc<A>) -> Self {
        Self {
            live: LiveSync::mount(controller).await,
            auth,
            reply: None,
        }
    }

    pub fn controller(&self) -> &Arc<SyncController<G>> {
        self.live.controller()
    }

    pub fn sync_state(&self) -> SubscriptionState {
        self.live.state()
    }

    pub fn questions(&self) -> Vec<Question> {
        self.controller().questions()
    }

    pub fn responses(&self, question_id: &str) -> Option<Vec<Response>> {
        self.controller().responses(question_id)
    }

    pub async fn toggle_replies(&self, question_id: &str) -> bool {
        self.controller().toggle_replies(question_id).await
    }

    pub fn reply(&self) -> Option<&ReplyDraft> {
        self.reply.as_ref()
    }

    /// Open the reply box under a question. Signed-out users are sent to login.
    pub fn open_reply(&mut self, question_id: &str) -> Outcome {
        if self.auth.current_session().is_none() {
            return Outcome::from_error(&AppError::AuthRequired(
                "You must be signed in to reply.".to_string(),
            ));
        }

        self.reply = Some(ReplyDraft {
            question_id: question_id.to_string(),
            body: String::new(),
        });
        Outcome::none()
    }

    pub fn set_reply_body(&mut self, body: impl Into<String>) {
        if let Some(reply) = self.reply.as_mut() {
            reply.body = body.into();
        }
    }

    pub fn close_reply(&mut self) {
        self.reply = None;
    }

    /// Post the open reply. The draft is kept when posting fails.
    pub async fn send_reply(&mut self) -> Outcome {
        let Some(reply) = self.reply.clone() else {
            return Outcome::none();
        };

        let session = self.auth.current_session();
        match self
            .controller()
            .submit_response(&reply.question_id, &reply.body, session.as_ref())
            .await
        {
            Ok(response) => {
                debug!(response_id = %response.id, "Reply sent");
                self.reply = None;
                Outcome::none()
            }
            Err(e) => Outcome::from_error(&e),
        }
    }

    /// First letter of the signed-in user's name, or `?`.
    pub fn avatar_initial(&self) -> char {
        self.auth
            .current_session()
            .and_then(|session| session.display_name().chars().next())
            .map(|c| c.to_uppercase().next().unwrap_or(c))
            .unwrap_or('?')
    }

    pub fn go_to_add_question(&self) -> Outcome {
        Outcome::navigate(Route::AddQuestion)
    }

    pub async fn sign_out(&mut self) -> Outcome {
        self.reply = None;
        match self.auth.sign_out().await {
            Ok(()) => Outcome::notice(Notice::info("Signed out.")),
            Err(e) => Outcome::from_error(&e),
        }
    }

    /// Stop live sync. Fetches still in flight are dropped.
    pub async fn unmount(&mut self) {
        self.reply = None;
        self.live.unmount().await;
    }
}
