//! Subscription lifecycle.
//!
//! A mounted view holds one [`LiveSync`]. Mounting registers the subscriptions and spawns a
//! single dispatcher task that feeds change notifications to the controller; unmounting
//! stops the task and releases the subscriptions.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Attachment, SyncController};
use crate::errors::AppError;
use crate::gateway::{ChangeFilter, Collection, EventMask, Gateway, Notification, Subscription};

/// Where a [`LiveSync`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
}

/// Live change subscriptions bound to one mounted view.
pub struct LiveSync<G: Gateway> {
    controller: Arc<SyncController<G>>,
    attachment: Option<Attachment<G>>,
    state: SubscriptionState,
    dispatcher: Option<JoinHandle<()>>,
}

impl<G: Gateway> LiveSync<G> {
    fn unsubscribed(controller: Arc<SyncController<G>>) -> Self {
        let attachment = controller.attach();
        Self {
            controller,
            attachment: Some(attachment),
            state: SubscriptionState::Unsubscribed,
            dispatcher: None,
        }
    }

    /// Watch every question and response, then load the question list.
    ///
    /// The initial load runs after the subscriptions are registered so no change can slip
    /// between the two. It also runs when subscribing fails.
    pub async fn mount(controller: Arc<SyncController<G>>) -> Self {
        let mut live = Self::unsubscribed(controller);
        live.state = SubscriptionState::Subscribing;

        let gateway = Arc::clone(live.controller.gateway());
        let subscribed = async {
            let questions = gateway
                .subscribe(Collection::Questions, EventMask::ALL, None)
                .await?;
            let responses = gateway
                .subscribe(Collection::Responses, EventMask::ALL, None)
                .await?;
            Ok::<_, AppError>((questions, responses))
        }
        .await;

        match subscribed {
            Ok((questions, responses)) => live.activate(Some(questions), Some(responses)),
            Err(e) => {
                error!(error = %e, "Failed to subscribe to forum changes");
                live.state = SubscriptionState::Unsubscribed;
            }
        }

        live.controller.load_questions().await;
        live
    }

    /// Watch new responses of a single question, then load its responses.
    pub async fn mount_thread(controller: Arc<SyncController<G>>, question_id: &str) -> Self {
        let mut live = Self::unsubscribed(controller);
        live.state = SubscriptionState::Subscribing;

        let subscribed = live
            .controller
            .gateway()
            .subscribe(
                Collection::Responses,
                EventMask::INSERT,
                Some(ChangeFilter::eq("question_id", question_id)),
            )
            .await;

        match subscribed {
            Ok(responses) => live.activate(None, Some(responses)),
            Err(e) => {
                error!(question_id, error = %e, "Failed to subscribe to thread changes");
                live.state = SubscriptionState::Unsubscribed;
            }
        }

        live.controller.load_responses(question_id).await;
        live
    }

    fn activate(&mut self, questions: Option<Subscription>, responses: Option<Subscription>) {
        let controller = Arc::clone(&self.controller);
        self.dispatcher = Some(tokio::spawn(dispatch(controller, questions, responses)));
        self.state = SubscriptionState::Active;
        info!("Live sync active");
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn controller(&self) -> &Arc<SyncController<G>> {
        &self.controller
    }

    /// Stop the dispatcher, release the subscriptions and this mount's claim on updates.
    ///
    /// Once no other mount holds the controller, late fetch results are dropped.
    pub async fn unmount(&mut self) {
        self.attachment.take();
        if let Some(task) = self.dispatcher.take() {
            task.abort();
            // Wait for the task to be dropped so its receivers are gone
            let _ = task.await;
        }
        self.state = SubscriptionState::Unsubscribed;
        info!("Live sync stopped");
    }
}

impl<G: Gateway> Drop for LiveSync<G> {
    fn drop(&mut self) {
        if let Some(task) = self.dispatcher.take() {
            debug!("Live sync dropped while mounted");
            task.abort();
        }
        self.attachment.take();
    }
}

async fn next(subscription: &mut Option<Subscription>) -> Option<Notification> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

/// Forward notifications to the controller, one at a time, until every feed closes.
async fn dispatch<G: Gateway>(
    controller: Arc<SyncController<G>>,
    mut questions: Option<Subscription>,
    mut responses: Option<Subscription>,
) {
    loop {
        let (collection, notification) = tokio::select! {
            n = next(&mut questions), if questions.is_some() => (Collection::Questions, n),
            n = next(&mut responses), if responses.is_some() => (Collection::Responses, n),
            else => break,
        };

        match notification {
            Some(Notification::Change(event)) => controller.handle_change(&event).await,
            Some(Notification::Resync { skipped }) => {
                warn!(%collection, skipped, "Missed change notifications, resyncing");
                match collection {
                    Collection::Questions => controller.load_questions().await,
                    _ => controller.reload_cached_responses().await,
                }
            }
            None => match collection {
                Collection::Questions => questions = None,
                _ => responses = None,
            },
        }
    }

    debug!("Dispatcher stopped");
}
