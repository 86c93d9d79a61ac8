//! Commands for the Buckets context.

use strata_core::context::Command;
use uuid::Uuid;

/// Command to create a bucket.
#[derive(Debug, Clone)]
pub struct CreateBucket {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// Display name.
    pub name: String,
    /// Display colour.
    pub color: String,
}

/// Command to rename a bucket.
#[derive(Debug, Clone)]
pub struct RenameBucket {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// New display name.
    pub name: String,
}

/// Command to change a bucket's colour.
#[derive(Debug, Clone)]
pub struct RecolorBucket {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The bucket identifier.
    pub bucket_id: Uuid,
    /// New display colour.
    pub color: String,
}

/// Command to soft-delete a bucket.
#[derive(Debug, Clone)]
pub struct DeleteBucket {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The bucket identifier.
    pub bucket_id: Uuid,
}

/// Command to restore a soft-deleted bucket.
#[derive(Debug, Clone)]
pub struct RestoreBucket {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The bucket identifier.
    pub bucket_id: Uuid,
}

/// Command to permanently remove a bucket.
#[derive(Debug, Clone)]
pub struct DestroyBucket {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user.
    pub actor: Uuid,
    /// The bucket identifier.
    pub bucket_id: Uuid,
}

macro_rules! impl_command {
    ($($command:ty => $name:literal),+ $(,)?) => {
        $(
            impl Command for $command {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }

                fn actor(&self) -> Option<Uuid> {
                    Some(self.actor)
                }
            }
        )+
    };
}

impl_command! {
    CreateBucket => "buckets.create",
    RenameBucket => "buckets.rename",
    RecolorBucket => "buckets.recolor",
    DeleteBucket => "buckets.delete",
    RestoreBucket => "buckets.restore",
    DestroyBucket => "buckets.destroy",
}
