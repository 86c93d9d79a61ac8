//! Command, query and read-model tests for the Buckets context.

use std::sync::Arc;

use strata_buckets::application::command_handlers::{
    handle_create_bucket, handle_delete_bucket, handle_destroy_bucket, handle_recolor_bucket,
    handle_rename_bucket, handle_restore_bucket,
};
use strata_buckets::application::query_handlers::{bucket_history, get_bucket_by_id};
use strata_buckets::application::read_model::BucketIndex;
use strata_buckets::domain::commands::{
    CreateBucket, DeleteBucket, DestroyBucket, RecolorBucket, RenameBucket, RestoreBucket,
};
use strata_buckets::domain::events::{BUCKET_CREATED, BUCKET_NAME_SET, BucketEvent};
use strata_core::broker::InMemoryBroker;
use strata_core::context::Clock;
use strata_core::error::EventStoreError;
use strata_core::memory::InMemoryRepository;
use strata_core::store::EventStore;
use strata_test_support::{FixedClock, test_instant};
use uuid::Uuid;

type Store = EventStore<InMemoryRepository, InMemoryBroker<()>>;

fn store() -> Store {
    EventStore::new(InMemoryRepository::new(), InMemoryBroker::new())
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(test_instant()))
}

fn create_command(bucket_id: Uuid, name: &str, color: &str) -> CreateBucket {
    CreateBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
        name: name.to_owned(),
        color: color.to_owned(),
    }
}

fn rename_command(bucket_id: Uuid, name: &str) -> RenameBucket {
    RenameBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
        name: name.to_owned(),
    }
}

fn delete_command(bucket_id: Uuid) -> DeleteBucket {
    DeleteBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
    }
}

#[tokio::test]
async fn test_create_then_rename_reloads_with_new_name() {
    // Arrange
    let store = store();
    let bucket_id = Uuid::new_v4();

    // Act
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    let result = handle_rename_bucket(&rename_command(bucket_id, "Sales2"), clock(), &store, &())
        .await
        .unwrap();
    let view = get_bucket_by_id(bucket_id, &store, &()).await.unwrap();

    // Assert
    assert_eq!(result.stream_version, 2);
    assert_eq!(view.bucket_id, bucket_id);
    assert_eq!(view.name, "Sales2");
    assert_eq!(view.color, "red");
    assert_eq!(view.version, 1);
    assert!(!view.deleted);
}

#[tokio::test]
async fn test_events_carry_command_actor_and_correlation() {
    let store = store();
    let bucket_id = Uuid::new_v4();
    let command = create_command(bucket_id, "Sales", "red");

    handle_create_bucket(&command, clock(), &store, &()).await.unwrap();

    let history = bucket_history(bucket_id, &store, &()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].metadata.actor, Some(command.actor));
    assert_eq!(history[0].metadata.correlation_id, Some(command.correlation_id));
    assert_eq!(history[0].metadata.occurred_at, test_instant());
}

#[tokio::test]
async fn test_rename_of_deleted_bucket_is_rejected_and_nothing_is_stored() {
    // Arrange
    let store = store();
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    handle_delete_bucket(&delete_command(bucket_id), clock(), &store, &())
        .await
        .unwrap();

    // Act
    let result =
        handle_rename_bucket(&rename_command(bucket_id, "Other"), clock(), &store, &()).await;

    // Assert
    match result {
        Err(EventStoreError::InvariantViolation(msg)) => assert_eq!(msg, "Bucket not found"),
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
    let view = get_bucket_by_id(bucket_id, &store, &()).await.unwrap();
    assert_eq!(view.name, "Sales");
    assert!(view.deleted);
    assert_eq!(bucket_history(bucket_id, &store, &()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_restore_then_recolor() {
    let store = store();
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    handle_delete_bucket(&delete_command(bucket_id), clock(), &store, &())
        .await
        .unwrap();

    let restore = RestoreBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
    };
    handle_restore_bucket(&restore, clock(), &store, &()).await.unwrap();
    let recolor = RecolorBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
        color: "blue".to_owned(),
    };
    let result = handle_recolor_bucket(&recolor, clock(), &store, &()).await.unwrap();

    let bucket = result.bucket.unwrap();
    assert_eq!(bucket.color, "blue");
    assert_eq!(bucket.deleted_at, None);
    assert_eq!(bucket.version, 3);
}

#[tokio::test]
async fn test_destroyed_bucket_is_not_found() {
    // Arrange
    let store = store();
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    let destroy = DestroyBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
    };

    // Act
    let result = handle_destroy_bucket(&destroy, clock(), &store, &()).await.unwrap();
    let view = get_bucket_by_id(bucket_id, &store, &()).await;

    // Assert
    assert!(result.bucket.is_none());
    match view {
        Err(EventStoreError::NotFound(msg)) => assert_eq!(msg, format!("Bucket {bucket_id}")),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_destroyed_bucket_stays_destroyed() {
    // Arrange
    let store = store();
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    let destroy = DestroyBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
    };
    handle_destroy_bucket(&destroy, clock(), &store, &()).await.unwrap();

    // Act
    let recreate =
        handle_create_bucket(&create_command(bucket_id, "Again", "blue"), clock(), &store, &())
            .await;
    let rename = handle_rename_bucket(&rename_command(bucket_id, "Again"), clock(), &store, &())
        .await;

    // Assert
    for result in [recreate.map(|_| ()), rename.map(|_| ())] {
        match result {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "Bucket is destroyed");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }
    let stream = format!("Bucket${bucket_id}");
    assert_eq!(store.stream_version(&(), &stream).await.unwrap(), 2);
}

#[tokio::test]
async fn test_create_for_existing_id_is_rejected() {
    let store = store();
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();

    let result =
        handle_create_bucket(&create_command(bucket_id, "Again", "red"), clock(), &store, &())
            .await;

    match result {
        Err(EventStoreError::InvariantViolation(msg)) => assert_eq!(msg, "Bucket already exists"),
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_index_follows_published_events() {
    // Arrange
    let store = store();
    let index = Arc::new(BucketIndex::new());
    let _subscription = index.subscribe(&store);
    let sales = Uuid::new_v4();
    let archive = Uuid::new_v4();

    // Act
    handle_create_bucket(&create_command(sales, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    handle_create_bucket(&create_command(archive, "Archive", "grey"), clock(), &store, &())
        .await
        .unwrap();
    handle_rename_bucket(&rename_command(sales, "Accounts"), clock(), &store, &())
        .await
        .unwrap();
    handle_delete_bucket(&delete_command(archive), clock(), &store, &())
        .await
        .unwrap();

    // Assert
    let active: Vec<String> = index.active().into_iter().map(|s| s.name).collect();
    assert_eq!(active, vec!["Accounts".to_owned()]);
    assert_eq!(index.get(archive).unwrap().deleted_at, Some(test_instant()));
}

#[tokio::test]
async fn test_index_drops_destroyed_buckets() {
    let store = store();
    let index = Arc::new(BucketIndex::new());
    let _subscription = index.subscribe(&store);
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();

    let destroy = DestroyBucket {
        correlation_id: Uuid::new_v4(),
        actor: Uuid::new_v4(),
        bucket_id,
    };
    handle_destroy_bucket(&destroy, clock(), &store, &()).await.unwrap();

    assert!(index.get(bucket_id).is_none());
}

#[tokio::test]
async fn test_unsubscribed_index_stops_updating() {
    let store = store();
    let index = Arc::new(BucketIndex::new());
    let subscription = index.subscribe(&store);
    subscription.unsubscribe();

    handle_create_bucket(&create_command(Uuid::new_v4(), "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();

    assert!(index.active().is_empty());
}

#[tokio::test]
async fn test_history_is_in_stream_order() {
    let store = store();
    let bucket_id = Uuid::new_v4();
    handle_create_bucket(&create_command(bucket_id, "Sales", "red"), clock(), &store, &())
        .await
        .unwrap();
    handle_rename_bucket(&rename_command(bucket_id, "Sales2"), clock(), &store, &())
        .await
        .unwrap();

    let types: Vec<&str> = bucket_history(bucket_id, &store, &())
        .await
        .unwrap()
        .iter()
        .map(|event| event.event_type())
        .collect();

    assert_eq!(types, vec![BUCKET_CREATED, BUCKET_NAME_SET]);
    assert!(matches!(
        bucket_history(bucket_id, &store, &()).await.unwrap()[1].data,
        BucketEvent::BucketNameSet(_)
    ));
}
