//! Query handlers for the Buckets context.
//!
//! Queries rebuild the bucket from its stream and return read-only views.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_core::aggregate::{Aggregate, AggregateRoot, stream_name_for};
use strata_core::broker::Broker;
use strata_core::context::EventContext;
use strata_core::error::EventStoreError;
use strata_core::event::Event;
use strata_core::repository::Repository;
use strata_core::store::EventStore;
use uuid::Uuid;

use crate::domain::aggregates::Bucket;
use crate::domain::events::BucketEvent;

/// Read-only view of a bucket.
#[derive(Debug, Serialize)]
pub struct BucketView {
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// Display name.
    pub name: String,
    /// Display colour.
    pub color: String,
    /// Number of changes since creation.
    pub version: u64,
    /// Whether the bucket is soft-deleted.
    pub deleted: bool,
    /// When the bucket last changed.
    pub updated_at: DateTime<Utc>,
}

/// Retrieves a bucket by id, including soft-deleted ones.
///
/// # Errors
///
/// Returns `EventStoreError::NotFound` if the bucket never existed or was
/// destroyed, or any store error.
pub async fn get_bucket_by_id<R, B>(
    bucket_id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketView, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    let mut root = AggregateRoot::<Bucket>::new(bucket_id.to_string(), EventContext::default());
    store.load_aggregate(db, &mut root).await?;
    let bucket = root.require_entity()?;
    Ok(BucketView {
        bucket_id: bucket.id,
        name: bucket.name.clone(),
        color: bucket.color.clone(),
        version: bucket.version,
        deleted: bucket.deleted_at.is_some(),
        updated_at: bucket.updated_at,
    })
}

/// Every bucket event recorded for `bucket_id`, oldest first.
///
/// # Errors
///
/// Returns any store or decoding error.
pub async fn bucket_history<R, B>(
    bucket_id: Uuid,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<Vec<Event<BucketEvent>>, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    store
        .scope::<BucketEvent>()
        .read()
        .stream(stream_name_for(Bucket::NAME, &bucket_id.to_string()))
        .to_vec(db)
        .await
}
