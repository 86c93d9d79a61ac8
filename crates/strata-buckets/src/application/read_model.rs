//! In-process bucket index kept current by broker subscriptions.
//!
//! The index is rebuilt from scratch on process start by re-subscribing and
//! replaying; every update is idempotent so duplicate delivery is harmless.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_core::broker::{Broker, EventHandler, Subscription};
use strata_core::error::EventStoreError;
use strata_core::event::{DomainEvent, Event};
use strata_core::repository::{Repository, StoredEvent};
use strata_core::store::EventStore;
use uuid::Uuid;

use crate::domain::events::BucketEvent;

/// One row of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// Display name.
    pub name: String,
    /// Display colour.
    pub color: String,
    /// When the bucket was soft-deleted, if it is.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Bucket summaries keyed by id.
#[derive(Debug, Default)]
pub struct BucketIndex {
    entries: RwLock<BTreeMap<Uuid, BucketSummary>>,
}

impl BucketIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the index for every bucket event type.
    pub fn subscribe<R, B>(self: &Arc<Self>, store: &EventStore<R, B>) -> Subscription
    where
        R: Repository,
        B: Broker<R::Db>,
    {
        let handler: Arc<dyn EventHandler<R::Db>> = self.clone();
        store
            .scope::<BucketEvent>()
            .subscribe(BucketEvent::EVENT_TYPES, handler)
    }

    /// The summary for `bucket_id`, deleted or not.
    #[must_use]
    pub fn get(&self, bucket_id: Uuid) -> Option<BucketSummary> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&bucket_id)
            .cloned()
    }

    /// Buckets that are not soft-deleted, ordered by name.
    #[must_use]
    pub fn active(&self) -> Vec<BucketSummary> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<BucketSummary> = entries
            .values()
            .filter(|summary| summary.deleted_at.is_none())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        active
    }

    fn apply(&self, event: &Event<BucketEvent>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let bucket_id = event.data.bucket_id();
        match &event.data {
            BucketEvent::BucketCreated(e) => {
                entries.insert(
                    bucket_id,
                    BucketSummary {
                        bucket_id,
                        name: e.name.clone(),
                        color: e.color.clone(),
                        deleted_at: None,
                    },
                );
            }
            BucketEvent::BucketDestroyed(_) => {
                entries.remove(&bucket_id);
            }
            data => {
                let Some(summary) = entries.get_mut(&bucket_id) else {
                    tracing::warn!(%bucket_id, event_type = data.event_type(), "unknown bucket");
                    return;
                };
                match data {
                    BucketEvent::BucketNameSet(e) => summary.name.clone_from(&e.name),
                    BucketEvent::BucketColorSet(e) => summary.color.clone_from(&e.color),
                    BucketEvent::BucketDeleted(_) => {
                        summary.deleted_at = Some(event.metadata.occurred_at);
                    }
                    BucketEvent::BucketRestored(_) => summary.deleted_at = None,
                    BucketEvent::BucketCreated(_) | BucketEvent::BucketDestroyed(_) => {}
                }
            }
        }
    }
}

#[async_trait]
impl<Db: Send + Sync> EventHandler<Db> for BucketIndex {
    async fn handle(&self, _db: &Db, event: &StoredEvent) -> Result<(), EventStoreError> {
        let event = Event::<BucketEvent>::from_stored(event)?;
        self.apply(&event);
        Ok(())
    }
}
