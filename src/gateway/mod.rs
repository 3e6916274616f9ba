//! Remote data gateway contract.
//!
//! The synchronization layer only talks to the backend through [`Gateway`]: query rows,
//! insert rows, and subscribe to per-collection change notifications. Rows travel as raw
//! JSON objects; turning them into canonical records is the normalizer's job.

mod feed;
mod local;

pub use feed::*;
pub use local::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::AppError;

/// Named record collections exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Questions,
    Responses,
    Profiles,
    Themes,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Questions => "questions",
            Collection::Responses => "responses",
            Collection::Profiles => "profiles",
            Collection::Themes => "themes",
        }
    }

    /// Columns that may be used in filters and ordering.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Collection::Questions => &[
                "id",
                "title",
                "content",
                "author_id",
                "theme_id",
                "created_at",
            ],
            Collection::Responses => &["id", "question_id", "author_id", "content", "created_at"],
            Collection::Profiles => &["id", "username", "email"],
            Collection::Themes => &["id", "name", "description"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

/// Sort order for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Query against one collection: equality filters, optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Kind of row change carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Set of change kinds a subscription wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: EventMask = EventMask {
        insert: true,
        update: true,
        delete: true,
    };

    pub const INSERT: EventMask = EventMask {
        insert: true,
        update: false,
        delete: false,
    };

    pub fn contains(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }
}

/// A single row change in a watched collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Collection,
    pub kind: ChangeKind,
    pub new: Option<Value>,
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: Collection, row: Value) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        }
    }

    pub fn delete(table: Collection, row: Value) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            new: None,
            old: Some(row),
        }
    }

    /// Read a string field, preferring the new row and falling back to the old one.
    pub fn field(&self, name: &str) -> Option<&str> {
        fn pick<'v>(row: &'v Option<Value>, name: &str) -> Option<&'v str> {
            row.as_ref()?
                .get(name)?
                .as_str()
                .filter(|s| !s.is_empty())
        }
        pick(&self.new, name).or_else(|| pick(&self.old, name))
    }
}

/// Column filter applied to change notifications, e.g. `question_id = <id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.field(&self.column) == Some(self.value.as_str())
    }
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A matching row change
    Change(ChangeEvent),
    /// Notifications were dropped; whatever the subscriber watches must be refetched
    Resync { skipped: u64 },
}

/// A live, cancellable stream of change notifications for one collection.
///
/// Dropping the subscription releases its slot on the change feed.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    mask: EventMask,
    filter: Option<ChangeFilter>,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        collection: Collection,
        mask: EventMask,
        filter: Option<ChangeFilter>,
        receiver: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            collection,
            mask,
            filter,
            receiver,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        event.table == self.collection
            && self.mask.contains(event.kind)
            && self.filter.as_ref().map_or(true, |f| f.matches(event))
    }

    /// Wait for the next matching notification. Returns `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(Notification::Change(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        collection = %self.collection,
                        skipped,
                        "Subscription lagged behind the change feed"
                    );
                    return Some(Notification::Resync { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(collection = %self.collection, "Change feed closed");
                    return None;
                }
            }
        }
    }
}

/// Backend operations the synchronization layer consumes.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Fetch rows of a collection, relations embedded.
    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Value>, AppError>;

    /// Insert one row and return the created row(s), relations embedded.
    async fn insert(&self, collection: Collection, record: Value) -> Result<Vec<Value>, AppError>;

    /// Register for change notifications. Returns once the subscription is active.
    async fn subscribe(
        &self,
        collection: Collection,
        mask: EventMask,
        filter: Option<ChangeFilter>,
    ) -> Result<Subscription, AppError>;
}
