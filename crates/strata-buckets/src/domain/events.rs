//! Domain events for the Buckets context.

use serde::{Deserialize, Serialize};
use strata_core::event::DomainEvent;
use uuid::Uuid;

/// Event type constant for bucket creation.
pub const BUCKET_CREATED: &str = "BucketCreated";
/// Event type constant for bucket renaming.
pub const BUCKET_NAME_SET: &str = "BucketNameSet";
/// Event type constant for bucket recolouring.
pub const BUCKET_COLOR_SET: &str = "BucketColorSet";
/// Event type constant for soft deletion.
pub const BUCKET_DELETED: &str = "BucketDeleted";
/// Event type constant for restoring a soft-deleted bucket.
pub const BUCKET_RESTORED: &str = "BucketRestored";
/// Event type constant for permanent removal.
pub const BUCKET_DESTROYED: &str = "BucketDestroyed";

/// Emitted when a bucket is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCreated {
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// Display name.
    pub name: String,
    /// Display colour.
    pub color: String,
}

/// Emitted when a bucket is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNameSet {
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// New display name.
    pub name: String,
}

/// Emitted when a bucket's colour changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketColorSet {
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// New display colour.
    pub color: String,
}

/// Emitted when a bucket is soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDeleted {
    /// The bucket identifier.
    pub bucket_id: Uuid,
}

/// Emitted when a soft-deleted bucket is restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRestored {
    /// The bucket identifier.
    pub bucket_id: Uuid,
}

/// Emitted when a bucket is permanently removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDestroyed {
    /// The bucket identifier.
    pub bucket_id: Uuid,
}

/// Event payload variants for the Buckets context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BucketEvent {
    /// A bucket has been created.
    BucketCreated(BucketCreated),
    /// A bucket has been renamed.
    BucketNameSet(BucketNameSet),
    /// A bucket's colour has changed.
    BucketColorSet(BucketColorSet),
    /// A bucket has been soft-deleted.
    BucketDeleted(BucketDeleted),
    /// A bucket has been restored.
    BucketRestored(BucketRestored),
    /// A bucket has been destroyed.
    BucketDestroyed(BucketDestroyed),
}

impl BucketEvent {
    /// The bucket this event belongs to.
    #[must_use]
    pub fn bucket_id(&self) -> Uuid {
        match self {
            Self::BucketCreated(e) => e.bucket_id,
            Self::BucketNameSet(e) => e.bucket_id,
            Self::BucketColorSet(e) => e.bucket_id,
            Self::BucketDeleted(e) => e.bucket_id,
            Self::BucketRestored(e) => e.bucket_id,
            Self::BucketDestroyed(e) => e.bucket_id,
        }
    }
}

impl DomainEvent for BucketEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        BUCKET_CREATED,
        BUCKET_NAME_SET,
        BUCKET_COLOR_SET,
        BUCKET_DELETED,
        BUCKET_RESTORED,
        BUCKET_DESTROYED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::BucketCreated(_) => BUCKET_CREATED,
            Self::BucketNameSet(_) => BUCKET_NAME_SET,
            Self::BucketColorSet(_) => BUCKET_COLOR_SET,
            Self::BucketDeleted(_) => BUCKET_DELETED,
            Self::BucketRestored(_) => BUCKET_RESTORED,
            Self::BucketDestroyed(_) => BUCKET_DESTROYED,
        }
    }
}
