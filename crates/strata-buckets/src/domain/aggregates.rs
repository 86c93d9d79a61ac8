//! Aggregate roots for the Buckets context.

use chrono::{DateTime, Utc};
use strata_core::aggregate::{Aggregate, AggregateRoot};
use strata_core::ensure;
use strata_core::error::EventStoreError;
use strata_core::event::Event;
use strata_core::lifecycle::{self, SoftDelete, Transition};
use uuid::Uuid;

use super::events::{
    BucketColorSet, BucketCreated, BucketDeleted, BucketDestroyed, BucketEvent, BucketNameSet,
    BucketRestored,
};

/// A named, coloured bucket.
///
/// `version` is 0 at creation and increases by one for every later change,
/// including soft deletion and restoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Display colour.
    pub color: String,
    /// Number of changes since creation.
    pub version: u64,
    /// When the bucket was created.
    pub created_at: DateTime<Utc>,
    /// When the bucket last changed.
    pub updated_at: DateTime<Utc>,
    /// When the bucket was soft-deleted, if it is.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDelete for Bucket {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

fn transition_of(event: &BucketEvent) -> Transition {
    match event {
        BucketEvent::BucketCreated(_) => Transition::Create,
        BucketEvent::BucketNameSet(_) | BucketEvent::BucketColorSet(_) => Transition::Mutate,
        BucketEvent::BucketDeleted(_) => Transition::SoftDelete,
        BucketEvent::BucketRestored(_) => Transition::Restore,
        BucketEvent::BucketDestroyed(_) => Transition::Destroy,
    }
}

impl Aggregate for Bucket {
    type Event = BucketEvent;
    const NAME: &'static str = "Bucket";

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn apply(
        entity: Option<&Self>,
        event: &Event<BucketEvent>,
    ) -> Result<Option<Self>, EventStoreError> {
        lifecycle::guard(Self::NAME, entity, transition_of(&event.data))?;
        let at = event.metadata.occurred_at;

        let Some(current) = entity else {
            // Only creation is allowed from the missing state.
            return match &event.data {
                BucketEvent::BucketCreated(e) => {
                    ensure!(!e.name.trim().is_empty(), "bucket name must not be empty");
                    Ok(Some(Bucket {
                        id: e.bucket_id,
                        name: e.name.clone(),
                        color: e.color.clone(),
                        version: 0,
                        created_at: at,
                        updated_at: at,
                        deleted_at: None,
                    }))
                }
                _ => Err(EventStoreError::InvariantViolation(format!(
                    "{} not found",
                    Self::NAME
                ))),
            };
        };

        let mut next = current.clone();
        match &event.data {
            BucketEvent::BucketDestroyed(_) => return Ok(None),
            BucketEvent::BucketNameSet(e) => {
                ensure!(!e.name.trim().is_empty(), "bucket name must not be empty");
                next.name = e.name.clone();
            }
            BucketEvent::BucketColorSet(e) => next.color = e.color.clone(),
            BucketEvent::BucketDeleted(_) => next.deleted_at = Some(at),
            BucketEvent::BucketRestored(_) => next.deleted_at = None,
            BucketEvent::BucketCreated(_) => {
                return Err(EventStoreError::InvariantViolation(format!(
                    "{} already exists",
                    Self::NAME
                )));
            }
        }
        next.version += 1;
        next.updated_at = at;
        Ok(Some(next))
    }
}

/// Records the creation of a bucket.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket already exists
/// or the name is blank.
pub fn create(
    root: &mut AggregateRoot<Bucket>,
    bucket_id: Uuid,
    name: &str,
    color: &str,
) -> Result<(), EventStoreError> {
    root.apply_event(BucketEvent::BucketCreated(BucketCreated {
        bucket_id,
        name: name.to_owned(),
        color: color.to_owned(),
    }))?;
    Ok(())
}

/// Renames a live bucket.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// deleted, or the name is blank.
pub fn rename(root: &mut AggregateRoot<Bucket>, name: &str) -> Result<(), EventStoreError> {
    let bucket_id = live_id(root)?;
    root.apply_event(BucketEvent::BucketNameSet(BucketNameSet {
        bucket_id,
        name: name.to_owned(),
    }))?;
    Ok(())
}

/// Changes the colour of a live bucket.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// deleted.
pub fn recolor(root: &mut AggregateRoot<Bucket>, color: &str) -> Result<(), EventStoreError> {
    let bucket_id = live_id(root)?;
    root.apply_event(BucketEvent::BucketColorSet(BucketColorSet {
        bucket_id,
        color: color.to_owned(),
    }))?;
    Ok(())
}

/// Soft-deletes a live bucket.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// already deleted.
pub fn delete(root: &mut AggregateRoot<Bucket>) -> Result<(), EventStoreError> {
    let bucket_id = live_id(root)?;
    root.apply_event(BucketEvent::BucketDeleted(BucketDeleted { bucket_id }))?;
    Ok(())
}

/// Restores a soft-deleted bucket.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing or
/// not deleted.
pub fn restore(root: &mut AggregateRoot<Bucket>) -> Result<(), EventStoreError> {
    let bucket_id = live_id(root)?;
    root.apply_event(BucketEvent::BucketRestored(BucketRestored { bucket_id }))?;
    Ok(())
}

/// Permanently removes a bucket, deleted or not.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` if the bucket is missing.
pub fn destroy(root: &mut AggregateRoot<Bucket>) -> Result<(), EventStoreError> {
    let bucket_id = live_id(root)?;
    root.apply_event(BucketEvent::BucketDestroyed(BucketDestroyed { bucket_id }))?;
    Ok(())
}

fn live_id(root: &AggregateRoot<Bucket>) -> Result<Uuid, EventStoreError> {
    root.live_entity().map(|bucket| bucket.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::context::EventContext;
    use strata_core::event::EventMetadata;
    use strata_test_support::{fixed_context, test_instant};

    fn root_for(id: Uuid) -> AggregateRoot<Bucket> {
        AggregateRoot::new(id.to_string(), fixed_context(Uuid::new_v4()))
    }

    fn created(id: Uuid) -> Event<BucketEvent> {
        Event::new(
            BucketEvent::BucketCreated(BucketCreated {
                bucket_id: id,
                name: "Sales".to_owned(),
                color: "red".to_owned(),
            }),
            EventMetadata::at(test_instant()),
        )
    }

    #[test]
    fn test_create_then_rename_keeps_colour_and_bumps_version() {
        // Arrange
        let id = Uuid::new_v4();
        let mut root = root_for(id);

        // Act
        create(&mut root, id, "Sales", "red").unwrap();
        rename(&mut root, "Sales2").unwrap();

        // Assert
        let bucket = root.entity().unwrap();
        assert_eq!(bucket.id, id);
        assert_eq!(bucket.name, "Sales2");
        assert_eq!(bucket.color, "red");
        assert_eq!(bucket.version, 1);
        assert_eq!(root.unpublished_events().len(), 2);
    }

    #[test]
    fn test_apply_created_sets_timestamps_from_metadata() {
        let id = Uuid::new_v4();

        let bucket = Bucket::apply(None, &created(id)).unwrap().unwrap();

        assert_eq!(bucket.created_at, test_instant());
        assert_eq!(bucket.updated_at, test_instant());
        assert_eq!(bucket.deleted_at, None);
        assert_eq!(bucket.version, 0);
    }

    #[test]
    fn test_mutating_soft_deleted_bucket_is_rejected_and_entity_unchanged() {
        // Arrange
        let id = Uuid::new_v4();
        let mut root = root_for(id);
        create(&mut root, id, "Sales", "red").unwrap();
        delete(&mut root).unwrap();
        let before = root.entity().cloned();

        // Act
        let result = root.apply_event(BucketEvent::BucketNameSet(BucketNameSet {
            bucket_id: id,
            name: "Other".to_owned(),
        }));

        // Assert
        match result {
            Err(EventStoreError::InvariantViolation(msg)) => assert_eq!(msg, "Bucket not found"),
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
        assert_eq!(root.entity().cloned(), before);
        assert_eq!(root.unpublished_events().len(), 2);
    }

    #[test]
    fn test_restore_clears_deleted_at() {
        let id = Uuid::new_v4();
        let mut root = root_for(id);
        create(&mut root, id, "Sales", "red").unwrap();
        delete(&mut root).unwrap();

        restore(&mut root).unwrap();

        let bucket = root.entity().unwrap();
        assert_eq!(bucket.deleted_at, None);
        assert_eq!(bucket.version, 2);
    }

    #[test]
    fn test_restore_live_bucket_is_rejected() {
        let id = Uuid::new_v4();
        let mut root = root_for(id);
        create(&mut root, id, "Sales", "red").unwrap();

        match restore(&mut root) {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "Bucket is not deleted");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_destroy_soft_deleted_bucket_reduces_to_none() {
        let id = Uuid::new_v4();
        let mut root = root_for(id);
        create(&mut root, id, "Sales", "red").unwrap();
        delete(&mut root).unwrap();

        destroy(&mut root).unwrap();

        assert!(root.entity().is_none());
    }

    #[test]
    fn test_destroyed_bucket_cannot_be_recreated() {
        let id = Uuid::new_v4();
        let mut root = root_for(id);
        create(&mut root, id, "Sales", "red").unwrap();
        destroy(&mut root).unwrap();

        let result = create(&mut root, id, "Again", "blue");

        match result {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "Bucket is destroyed");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
        assert!(root.is_destroyed());
        assert!(root.entity().is_none());
        assert_eq!(root.unpublished_events().len(), 2);
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let id = Uuid::new_v4();
        let mut root = root_for(id);
        create(&mut root, id, "Sales", "red").unwrap();

        match create(&mut root, id, "Sales", "red") {
            Err(EventStoreError::InvariantViolation(msg)) => {
                assert_eq!(msg, "Bucket already exists");
            }
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let id = Uuid::new_v4();
        let mut root = AggregateRoot::<Bucket>::new(id.to_string(), EventContext::default());

        let result = create(&mut root, id, "   ", "red");

        assert!(result.unwrap_err().is_invariant_violation());
        assert!(root.entity().is_none());
    }
}
