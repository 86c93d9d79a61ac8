//! Soft-delete / restore / destroy as an explicit transition table.
//!
//! Reducers classify each event as a [`Transition`] and ask [`guard`] whether
//! it is allowed from the entity's current [`Lifecycle`] state before touching
//! any field. A destroyed entity reduces to `None`; the
//! [`AggregateRoot`](crate::aggregate::AggregateRoot) keeps the tombstone and
//! classifies the stream as [`Lifecycle::Destroyed`], which accepts nothing.

use chrono::{DateTime, Utc};

use crate::error::EventStoreError;

/// Lifecycle state of a reduced entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never created.
    Missing,
    /// Live entity.
    Active,
    /// Marked deleted; reversible.
    SoftDeleted,
    /// Removed permanently; terminal.
    Destroyed,
}

/// What an event does to an entity's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Brings a new entity into existence.
    Create,
    /// Changes fields of a live entity.
    Mutate,
    /// Marks a live entity deleted.
    SoftDelete,
    /// Reverses a soft delete.
    Restore,
    /// Removes an entity permanently.
    Destroy,
}

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The entity is missing or soft-deleted.
    NotFound,
    /// The entity already exists.
    AlreadyExists,
    /// Restore was requested for an entity that is not deleted.
    NotDeleted,
    /// The entity was destroyed.
    Destroyed,
}

/// Entities that carry a soft-delete marker.
pub trait SoftDelete {
    /// When the entity was soft-deleted, if it is.
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
}

impl Lifecycle {
    /// Classifies an optional entity. `None` is [`Lifecycle::Missing`]; use
    /// [`Lifecycle::of_stream`] when a destroy may already have happened.
    #[must_use]
    pub fn of<E: SoftDelete>(entity: Option<&E>) -> Self {
        Self::of_stream(entity, false)
    }

    /// Classifies an optional entity given whether its stream has recorded a
    /// destroy.
    #[must_use]
    pub fn of_stream<E: SoftDelete>(entity: Option<&E>, destroyed: bool) -> Self {
        match entity {
            None if destroyed => Self::Destroyed,
            None => Self::Missing,
            Some(e) if e.deleted_at().is_some() => Self::SoftDeleted,
            Some(_) => Self::Active,
        }
    }

    /// Looks up the transition table.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] for disallowed pairs.
    pub fn apply(self, transition: Transition) -> Result<Self, Rejection> {
        use Lifecycle::{Active, Destroyed, Missing, SoftDeleted};
        use Transition::{Create, Destroy, Mutate, Restore, SoftDelete};

        match (self, transition) {
            (Missing, Create) => Ok(Active),
            (Missing, _) => Err(Rejection::NotFound),

            (Active, Mutate) => Ok(Active),
            (Active, SoftDelete) => Ok(SoftDeleted),
            (Active, Destroy) | (SoftDeleted, Destroy) => Ok(Destroyed),
            (Active, Create) | (SoftDeleted, Create) => Err(Rejection::AlreadyExists),
            (Active, Restore) => Err(Rejection::NotDeleted),

            (SoftDeleted, Restore) => Ok(Active),
            (SoftDeleted, Mutate | SoftDelete) => Err(Rejection::NotFound),

            (Destroyed, _) => Err(Rejection::Destroyed),
        }
    }
}

/// Maps a [`Rejection`] to the error raised for `aggregate_name`.
#[must_use]
pub fn violation(aggregate_name: &str, rejection: Rejection) -> EventStoreError {
    let message = match rejection {
        Rejection::NotFound => format!("{aggregate_name} not found"),
        Rejection::AlreadyExists => format!("{aggregate_name} already exists"),
        Rejection::NotDeleted => format!("{aggregate_name} is not deleted"),
        Rejection::Destroyed => format!("{aggregate_name} is destroyed"),
    };
    EventStoreError::InvariantViolation(message)
}

/// Checks `transition` against `entity`'s lifecycle.
///
/// # Errors
///
/// Returns `EventStoreError::InvariantViolation` with a message naming the
/// aggregate: "`<name>` not found", "`<name>` already exists" or
/// "`<name>` is not deleted".
pub fn guard<E: SoftDelete>(
    aggregate_name: &str,
    entity: Option<&E>,
    transition: Transition,
) -> Result<Lifecycle, EventStoreError> {
    Lifecycle::of(entity)
        .apply(transition)
        .map_err(|rejection| violation(aggregate_name, rejection))
}
