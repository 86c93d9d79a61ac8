//! Command handlers for the Buckets context.
//!
//! Each handler loads the bucket's stream into an aggregate root, runs the
//! domain operation, and publishes the resulting events through the store.

use std::sync::Arc;

use strata_core::aggregate::AggregateRoot;
use strata_core::broker::Broker;
use strata_core::context::{Clock, Command, EventContext};
use strata_core::error::EventStoreError;
use strata_core::repository::Repository;
use strata_core::store::EventStore;
use uuid::Uuid;

use crate::domain::aggregates::{self, Bucket};
use crate::domain::commands::{
    CreateBucket, DeleteBucket, DestroyBucket, RecolorBucket, RenameBucket, RestoreBucket,
};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct BucketCommandResult {
    /// The bucket affected by the command.
    pub bucket_id: Uuid,
    /// Stream version after the command's events were stored.
    pub stream_version: u64,
    /// The bucket as reduced after the command; `None` once destroyed.
    pub bucket: Option<Bucket>,
}

async fn execute<R, B>(
    command: &dyn Command,
    bucket_id: Uuid,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
    operation: impl FnOnce(&mut AggregateRoot<Bucket>) -> Result<(), EventStoreError> + Send,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    tracing::info!(
        command = command.command_type(),
        correlation_id = %command.correlation_id(),
        %bucket_id,
        "handling command"
    );
    let context = EventContext::for_command(command, clock);
    let mut root = AggregateRoot::<Bucket>::new(bucket_id.to_string(), context);
    store.with_aggregate(db, &mut root, operation).await?;
    Ok(BucketCommandResult {
        bucket_id,
        stream_version: root.version(),
        bucket: root.entity().cloned(),
    })
}

/// Handles the `CreateBucket` command: records the new bucket and persists
/// the resulting event.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket already exists
/// or the name is blank, or any store error.
pub async fn handle_create_bucket<R, B>(
    command: &CreateBucket,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.bucket_id, clock, store, db, |root| {
        aggregates::create(root, command.bucket_id, &command.name, &command.color)
    })
    .await
}

/// Handles the `RenameBucket` command: loads the bucket, renames it, and
/// persists the resulting event.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing,
/// deleted, or the name is blank, or any store error.
pub async fn handle_rename_bucket<R, B>(
    command: &RenameBucket,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.bucket_id, clock, store, db, |root| {
        aggregates::rename(root, &command.name)
    })
    .await
}

/// Handles the `RecolorBucket` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// deleted, or any store error.
pub async fn handle_recolor_bucket<R, B>(
    command: &RecolorBucket,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.bucket_id, clock, store, db, |root| {
        aggregates::recolor(root, &command.color)
    })
    .await
}

/// Handles the `DeleteBucket` command: soft-deletes the bucket.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// already deleted, or any store error.
pub async fn handle_delete_bucket<R, B>(
    command: &DeleteBucket,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.bucket_id, clock, store, db, aggregates::delete).await
}

/// Handles the `RestoreBucket` command.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// not deleted, or any store error.
pub async fn handle_restore_bucket<R, B>(
    command: &RestoreBucket,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.bucket_id, clock, store, db, aggregates::restore).await
}

/// Handles the `DestroyBucket` command: removes the bucket permanently.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing, or
/// any store error.
pub async fn handle_destroy_bucket<R, B>(
    command: &DestroyBucket,
    clock: Arc<dyn Clock>,
    store: &EventStore<R, B>,
    db: &R::Db,
) -> Result<BucketCommandResult, EventStoreError>
where
    R: Repository,
    B: Broker<R::Db>,
{
    execute(command, command.bucket_id, clock, store, db, aggregates::destroy).await
}
