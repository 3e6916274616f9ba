use std::sync::Arc;

use tracing::error;

use super::{Notice, Outcome, Route};
use crate::auth::AuthProvider;
use crate::gateway::Gateway;
use crate::models::{QuestionDraft, Theme};
use crate::sync::SyncController;

/// New question form with a theme picker.
pub struct AddQuestionScreen<G: Gateway, A: AuthProvider> {
    controller: Arc<SyncController<G>>,
    auth: Arc<A>,
    themes: Vec<Theme>,
    pub draft: QuestionDraft,
    loading: bool,
}

impl<G: Gateway, A: AuthProvider> AddQuestionScreen<G, A> {
    pub fn new(controller: Arc<SyncController<G>>, auth: Arc<A>) -> Self {
        Self {
            controller,
            auth,
            themes: Vec::new(),
            draft: QuestionDraft::default(),
            loading: false,
        }
    }

    /// Load the theme list and preselect the first theme.
    pub async fn load_themes(&mut self) -> Outcome {
        match self.controller.load_themes().await {
            Ok(themes) => {
                if self.draft.theme_id.is_none() {
                    self.draft.theme_id = themes.first().map(|t| t.id.clone());
                }
                self.themes = themes;
                Outcome::none()
            }
            Err(e) => {
                error!(error = %e, "Failed to load themes");
                Outcome::notice(Notice::error("Could not load themes."))
            }
        }
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    pub fn select_theme(&mut self, theme_id: &str) {
        self.draft.theme_id = Some(theme_id.to_string());
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub async fn submit(&mut self) -> Outcome {
        self.loading = true;
        let session = self.auth.current_session();
        let result = self
            .controller
            .submit_question(&self.draft, session.as_ref())
            .await;
        self.loading = false;

        match result {
            Ok(_) => {
                self.draft = QuestionDraft {
                    theme_id: self.draft.theme_id.take(),
                    ..QuestionDraft::default()
                };
                Outcome::notice(Notice::success("Your question has been posted."))
                    .with_route(Route::Home)
            }
            Err(e) => Outcome::from_error(&e),
        }
    }

    pub fn cancel(&self) -> Outcome {
        Outcome::navigate(Route::Home)
    }
}
