//! Synchronization controller.
//!
//! Owns the question list, the response cache, per-question loading flags and reply
//! visibility. Every fetch replaces a whole slice; the only incremental change is the
//! append of a response this client just posted.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::cache::{QuestionList, ResponseCache};
use super::normalize::{
    normalize_question, normalize_questions, normalize_response, normalize_responses,
    normalize_themes,
};
use crate::auth::Session;
use crate::errors::AppError;
use crate::gateway::{ChangeEvent, Collection, Gateway, Query};
use crate::models::{NewProfile, NewQuestion, NewResponse, Question, QuestionDraft, Response, Theme};

#[derive(Default)]
struct FeedState {
    questions: QuestionList,
    responses: ResponseCache,
    /// In-flight response fetches per question
    loading: HashMap<String, usize>,
    visible: HashSet<String>,
    last_ticket: u64,
    questions_applied: u64,
    responses_applied: HashMap<String, u64>,
    /// Posted responses with the last ticket issued before their insert returned
    pending: HashMap<String, Vec<(u64, Response)>>,
    /// Live mounts holding an [`Attachment`]
    attachments: usize,
    detached: bool,
}

impl FeedState {
    fn responses_applied(&self, question_id: &str) -> u64 {
        self.responses_applied.get(question_id).copied().unwrap_or(0)
    }

    /// Put back posted responses a freshly applied fetch may have missed.
    fn reapply_pending(&mut self, question_id: &str, ticket: u64) {
        let Some(pending) = self.pending.get_mut(question_id) else {
            return;
        };
        // A fetch issued after the insert returned already contains the row
        pending.retain(|(issued_before, _)| ticket <= *issued_before);
        for (_, response) in pending.iter() {
            self.responses.append(response.clone());
        }
        let settled = pending.is_empty();
        if settled {
            self.pending.remove(question_id);
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bump(renders: &watch::Sender<u64>) {
    renders.send_modify(|revision| *revision += 1);
}

/// Clears a question's loading flag when dropped, whatever path the fetch took.
struct LoadingFlag<'a> {
    state: &'a Mutex<FeedState>,
    renders: &'a watch::Sender<u64>,
    question_id: String,
}

impl<'a> LoadingFlag<'a> {
    fn raise(state: &'a Mutex<FeedState>, renders: &'a watch::Sender<u64>, question_id: &str) -> Self {
        *lock(state).loading.entry(question_id.to_string()).or_insert(0) += 1;
        bump(renders);
        Self {
            state,
            renders,
            question_id: question_id.to_string(),
        }
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        {
            let mut state = lock(self.state);
            if let Some(count) = state.loading.get_mut(&self.question_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.loading.remove(&self.question_id);
                }
            }
        }
        bump(self.renders);
    }
}

/// A mount's claim on controller updates. Dropping it releases the claim.
///
/// Results keep being applied while at least one attachment is alive. When the last one
/// goes, fetches that resolve afterwards are dropped.
pub struct Attachment<G: Gateway> {
    controller: Arc<SyncController<G>>,
}

impl<G: Gateway> Drop for Attachment<G> {
    fn drop(&mut self) {
        let mut state = self.controller.state();
        state.attachments = state.attachments.saturating_sub(1);
        if state.attachments == 0 {
            state.detached = true;
        }
        debug!(remaining = state.attachments, "Controller attachment released");
    }
}

/// Keeps locally held questions and responses consistent with the backend.
pub struct SyncController<G: Gateway> {
    gateway: Arc<G>,
    state: Mutex<FeedState>,
    renders: watch::Sender<u64>,
}

impl<G: Gateway> SyncController<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        let (renders, _) = watch::channel(0);
        Self {
            gateway,
            state: Mutex::new(FeedState::default()),
            renders,
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Receiver whose value changes every time controller state changes.
    pub fn watch_renders(&self) -> watch::Receiver<u64> {
        self.renders.subscribe()
    }

    /// Register a mount. Updates are applied until every attachment is dropped.
    pub fn attach(self: &Arc<Self>) -> Attachment<G> {
        {
            let mut state = self.state();
            state.attachments += 1;
            state.detached = false;
        }
        Attachment {
            controller: Arc::clone(self),
        }
    }

    /// Stop applying results for every holder until the next [`attach`](Self::attach).
    pub fn detach(&self) {
        self.state().detached = true;
    }

    pub fn is_attached(&self) -> bool {
        !self.state().detached
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        lock(&self.state)
    }

    fn issue_ticket(&self) -> u64 {
        let mut state = self.state();
        state.last_ticket += 1;
        state.last_ticket
    }

    // ==================== READS ====================

    pub fn questions(&self) -> Vec<Question> {
        self.state().questions.as_slice().to_vec()
    }

    pub fn question(&self, id: &str) -> Option<Question> {
        self.state().questions.get(id).cloned()
    }

    pub fn responses(&self, question_id: &str) -> Option<Vec<Response>> {
        self.state().responses.get(question_id).map(<[Response]>::to_vec)
    }

    pub fn is_loading(&self, question_id: &str) -> bool {
        self.state().loading.contains_key(question_id)
    }

    pub fn replies_visible(&self, question_id: &str) -> bool {
        self.state().visible.contains(question_id)
    }

    // ==================== FETCHES ====================

    /// Refetch every question, newest first, and replace the list.
    ///
    /// Failures are logged and the previous list is kept.
    pub async fn load_questions(&self) {
        if let Err(e) = self.try_load_questions().await {
            error!(error = %e, "Failed to load questions");
        }
    }

    async fn try_load_questions(&self) -> Result<(), AppError> {
        let ticket = self.issue_ticket();
        let rows = self
            .gateway
            .query(
                Collection::Questions,
                &Query::new().order_by("created_at", false),
            )
            .await?;
        let questions = normalize_questions(rows);

        {
            let mut state = self.state();
            if state.detached {
                debug!("Dropping question fetch that resolved after detach");
                return Ok(());
            }
            if ticket <= state.questions_applied {
                debug!(ticket, "Dropping stale question fetch");
                return Ok(());
            }
            state.questions_applied = ticket;
            state.questions.replace(questions);
        }

        bump(&self.renders);
        Ok(())
    }

    /// Refetch a question's responses, oldest first, replace its cache entry and show them.
    ///
    /// Failures are logged and the previous entry is kept.
    pub async fn load_responses(&self, question_id: &str) {
        if let Err(e) = self.try_load_responses(question_id).await {
            error!(question_id, error = %e, "Failed to load responses");
        }
    }

    async fn try_load_responses(&self, question_id: &str) -> Result<(), AppError> {
        let ticket = self.issue_ticket();
        let _loading = LoadingFlag::raise(&self.state, &self.renders, question_id);

        let rows = self
            .gateway
            .query(
                Collection::Responses,
                &Query::new()
                    .eq("question_id", question_id)
                    .order_by("created_at", true),
            )
            .await?;
        let responses: Vec<Response> = normalize_responses(rows)
            .into_iter()
            .filter(|r| r.question_id == question_id)
            .collect();

        {
            let mut state = self.state();
            if state.detached {
                debug!(question_id, "Dropping response fetch that resolved after detach");
                return Ok(());
            }
            if ticket <= state.responses_applied(question_id) {
                debug!(question_id, ticket, "Dropping stale response fetch");
                return Ok(());
            }
            state.responses_applied.insert(question_id.to_string(), ticket);
            state.responses.replace(question_id, responses);
            state.reapply_pending(question_id, ticket);
            state.visible.insert(question_id.to_string());
        }

        bump(&self.renders);
        Ok(())
    }

    /// Refetch every question that has a cache entry.
    pub async fn reload_cached_responses(&self) {
        let cached = self.state().responses.question_ids();
        for question_id in cached {
            self.load_responses(&question_id).await;
        }
    }

    /// Refetch everything currently held: the question list and every cached thread.
    pub async fn resync(&self) {
        self.load_questions().await;
        self.reload_cached_responses().await;
    }

    /// Cheap existence check used to decide whether replies can be expanded.
    pub async fn has_responses(&self, question_id: &str) -> bool {
        let cached = !self.state().responses.is_empty_for(question_id);
        if cached {
            return true;
        }

        let query = Query::new().eq("question_id", question_id).limit(1);
        match self.gateway.query(Collection::Responses, &query).await {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                warn!(question_id, error = %e, "Response existence check failed");
                false
            }
        }
    }

    /// Hide the replies if shown; otherwise show them, fetching first if nothing is cached.
    ///
    /// Returns whether the replies are visible afterwards.
    pub async fn toggle_replies(&self, question_id: &str) -> bool {
        let needs_fetch = {
            let mut state = self.state();
            if state.visible.remove(question_id) {
                false
            } else if state.responses.is_empty_for(question_id) {
                true
            } else {
                state.visible.insert(question_id.to_string());
                false
            }
        };

        if needs_fetch {
            self.load_responses(question_id).await;
        } else {
            bump(&self.renders);
        }
        self.replies_visible(question_id)
    }

    /// Themes ordered by name, for the new-question form.
    pub async fn load_themes(&self) -> Result<Vec<Theme>, AppError> {
        let rows = self
            .gateway
            .query(Collection::Themes, &Query::new().order_by("name", true))
            .await?;
        Ok(normalize_themes(rows))
    }

    // ==================== CHANGE NOTIFICATIONS ====================

    pub async fn on_questions_changed(&self) {
        self.load_questions().await;
    }

    pub async fn on_responses_changed(&self, question_id: &str) {
        self.load_responses(question_id).await;
    }

    /// Route a change notification to the handler of its collection.
    pub async fn handle_change(&self, event: &ChangeEvent) {
        match event.table {
            Collection::Questions => self.on_questions_changed().await,
            Collection::Responses => match event.field("question_id") {
                Some(question_id) => self.on_responses_changed(question_id).await,
                None => warn!(kind = ?event.kind, "Response change without a question id"),
            },
            other => debug!(collection = %other, "Ignoring change notification"),
        }
    }

    // ==================== WRITES ====================

    /// Post a response and show it immediately.
    ///
    /// The created row is inserted into the cache at its chronological position; no
    /// refetch is needed for it to appear. Until a fetch issued after the insert lands,
    /// the row is put back after every refetch of the question.
    pub async fn submit_response(
        &self,
        question_id: &str,
        body: &str,
        session: Option<&Session>,
    ) -> Result<Response, AppError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation(
                "Write something before sending.".to_string(),
            ));
        }
        let session = session.ok_or_else(|| {
            AppError::AuthRequired("You must be signed in to reply.".to_string())
        })?;

        self.ensure_profile(session).await;

        let payload = serde_json::to_value(NewResponse {
            question_id: question_id.to_string(),
            content: body.to_string(),
            author_id: session.user_id.clone(),
        })?;
        let rows = self.gateway.insert(Collection::Responses, payload).await?;
        // Fetches issued before the insert returned may not contain the new row
        let issued_before = self.state().last_ticket;
        let created = rows.iter().find_map(normalize_response).ok_or_else(|| {
            AppError::Remote("The backend did not return the created response".to_string())
        })?;

        {
            let mut state = self.state();
            if !state.detached {
                state
                    .pending
                    .entry(question_id.to_string())
                    .or_default()
                    .push((issued_before, created.clone()));
                state.responses.append(created.clone());
                state.visible.insert(question_id.to_string());
            }
        }
        bump(&self.renders);

        info!(question_id, response_id = %created.id, "Response posted");
        Ok(created)
    }

    /// Post a question, then refresh the question list.
    pub async fn submit_question(
        &self,
        draft: &QuestionDraft,
        session: Option<&Session>,
    ) -> Result<Question, AppError> {
        let title = draft.title.trim();
        let content = draft.content.trim();
        let theme_id = draft
            .theme_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let Some(theme_id) = theme_id.filter(|_| !title.is_empty() && !content.is_empty()) else {
            return Err(AppError::Validation(
                "Please fill in every field.".to_string(),
            ));
        };
        let session = session.ok_or_else(|| {
            AppError::AuthRequired("You must be signed in to post a question.".to_string())
        })?;

        let payload = serde_json::to_value(NewQuestion {
            title: title.to_string(),
            content: content.to_string(),
            theme_id: theme_id.to_string(),
            author_id: session.user_id.clone(),
        })?;
        let rows = self.gateway.insert(Collection::Questions, payload).await?;
        let created = rows.iter().find_map(normalize_question).ok_or_else(|| {
            AppError::Remote("The backend did not return the created question".to_string())
        })?;

        info!(question_id = %created.id, "Question posted");
        self.load_questions().await;
        Ok(created)
    }

    /// Make sure the signed-in user has a profile row so their posts show a name.
    ///
    /// Failures are logged; posting goes ahead without a profile.
    pub async fn ensure_profile(&self, session: &Session) {
        if let Err(e) = self.try_ensure_profile(session).await {
            warn!(user_id = %session.user_id, error = %e, "Could not ensure profile");
        }
    }

    async fn try_ensure_profile(&self, session: &Session) -> Result<(), AppError> {
        let existing = self
            .gateway
            .query(
                Collection::Profiles,
                &Query::new().eq("id", session.user_id.as_str()).limit(1),
            )
            .await?;
        if !existing.is_empty() {
            return Ok(());
        }

        let payload = serde_json::to_value(NewProfile {
            id: session.user_id.clone(),
            username: session.display_name(),
            email: Some(session.email.clone()),
        })?;
        match self.gateway.insert(Collection::Profiles, payload).await {
            Ok(_) => {
                debug!(user_id = %session.user_id, "Created missing profile");
                Ok(())
            }
            // Created concurrently by another client
            Err(AppError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
