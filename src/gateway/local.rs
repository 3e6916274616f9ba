//! SQLite-backed gateway with an in-process change feed.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use super::{ChangeEvent, ChangeFeed, ChangeFilter, Collection, EventMask, Gateway, Query, Subscription};
use crate::db::Repository;
use crate::errors::AppError;

/// Gateway over the local database. Every write is announced on the change feed.
#[derive(Clone)]
pub struct LocalGateway {
    repo: Repository,
    feed: ChangeFeed,
}

impl LocalGateway {
    pub fn new(pool: SqlitePool, feed_capacity: usize) -> Self {
        Self {
            repo: Repository::new(pool),
            feed: ChangeFeed::new(feed_capacity),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Delete a row and announce it with the old row attached.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<Value, AppError> {
        let old = self
            .repo
            .delete_row(collection, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", collection, id)))?;

        tracing::debug!(%collection, id, "Row deleted");
        self.feed.emit(ChangeEvent::delete(collection, old.clone()));
        Ok(old)
    }
}

#[async_trait]
impl Gateway for LocalGateway {
    async fn query(&self, collection: Collection, query: &Query) -> Result<Vec<Value>, AppError> {
        self.repo.fetch_rows(collection, query).await
    }

    async fn insert(&self, collection: Collection, record: Value) -> Result<Vec<Value>, AppError> {
        let row = self.repo.insert_row(collection, &record).await?;

        tracing::debug!(%collection, id = ?row.get("id"), "Row inserted");
        self.feed.emit(ChangeEvent::insert(collection, row.clone()));
        Ok(vec![row])
    }

    async fn subscribe(
        &self,
        collection: Collection,
        mask: EventMask,
        filter: Option<ChangeFilter>,
    ) -> Result<Subscription, AppError> {
        if let Some(filter) = &filter {
            if !collection.has_column(&filter.column) {
                return Err(AppError::Remote(format!(
                    "Cannot filter {} on unknown column {}",
                    collection, filter.column
                )));
            }
        }

        tracing::debug!(%collection, ?mask, ?filter, "Subscription registered");
        Ok(Subscription::new(collection, mask, filter, self.feed.subscribe()))
    }
}
