//! Client-side synchronization layer.
//!
//! Raw rows from the gateway go through the normalizer into the question list and response
//! cache held by the controller; change notifications re-run the same fetch path.

pub mod cache;
mod controller;
mod live;
pub mod normalize;

pub use cache::{QuestionList, ResponseCache};
pub use controller::{Attachment, SyncController};
pub use live::{LiveSync, SubscriptionState};
