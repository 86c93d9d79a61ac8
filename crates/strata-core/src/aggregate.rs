//! Aggregate root abstraction and the load / mutate / store lifecycle.
//!
//! An [`AggregateRoot`] wraps a reducer-backed entity: it replays the
//! aggregate's stream to rebuild the entity, records newly applied events as
//! unpublished, and hands them to the [`EventStore`] in one ordered batch
//! guarded by the version captured at load time.

use std::fmt;

use crate::broker::Broker;
use crate::context::EventContext;
use crate::error::EventStoreError;
use crate::event::{DomainEvent, Event, EventInit};
use crate::lifecycle::{self, Rejection};
use crate::repository::{ExpectedVersion, Repository};
use crate::store::EventStore;

/// An entity reduced from its own event stream.
pub trait Aggregate: Clone + Send + Sync + Sized + 'static {
    /// The closed set of events this aggregate consumes.
    type Event: DomainEvent;

    /// Aggregate type name; prefixes stream names.
    const NAME: &'static str;

    /// The entity's identifier as used in its stream name.
    fn id(&self) -> String;

    /// Reduces one event over the current entity.
    ///
    /// Must be pure. Returning `Ok(None)` for an existing entity destroys it;
    /// the root then rejects every later event on the stream.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::InvariantViolation` when the event is not
    /// allowed in the entity's current state.
    fn apply(entity: Option<&Self>, event: &Event<Self::Event>)
    -> Result<Option<Self>, EventStoreError>;
}

/// Builds the conventional stream name `"{Name}${id}"`.
#[must_use]
pub fn stream_name_for(aggregate_name: &str, id: &str) -> String {
    format!("{aggregate_name}${id}")
}

#[derive(Debug, Clone)]
enum IdSource {
    Fixed(String),
    Entity,
}

/// Stateful wrapper around an [`Aggregate`].
///
/// `version` counts durably stored events; `unpublished` holds events applied
/// since the last load or store. `destroyed` is the tombstone left when the
/// entity reduces from `Some` to `None`.
pub struct AggregateRoot<A: Aggregate> {
    id: IdSource,
    entity: Option<A>,
    destroyed: bool,
    version: u64,
    unpublished: Vec<Event<A::Event>>,
    context: EventContext,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Creates an empty root for the aggregate with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>, context: EventContext) -> Self {
        Self {
            id: IdSource::Fixed(id.into()),
            entity: None,
            destroyed: false,
            version: 0,
            unpublished: Vec::new(),
            context,
        }
    }

    /// Creates an empty root whose id is read from the entity once the first
    /// event has been applied, and kept from then on.
    #[must_use]
    pub fn from_entity_id(context: EventContext) -> Self {
        Self {
            id: IdSource::Entity,
            entity: None,
            destroyed: false,
            version: 0,
            unpublished: Vec::new(),
            context,
        }
    }

    /// The current entity, `None` before creation or after destruction.
    #[must_use]
    pub fn entity(&self) -> Option<&A> {
        self.entity.as_ref()
    }

    /// The current entity.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::NotFound` if there is none.
    pub fn require_entity(&self) -> Result<&A, EventStoreError> {
        self.entity.as_ref().ok_or_else(|| {
            let id = self.id().unwrap_or_else(|_| "?".to_owned());
            EventStoreError::NotFound(format!("{} {id}", A::NAME))
        })
    }

    /// The current entity, for commands that act on it.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::InvariantViolation` with "`<Name>` not
    /// found" or "`<Name>` is destroyed" if there is none.
    pub fn live_entity(&self) -> Result<&A, EventStoreError> {
        match &self.entity {
            Some(entity) => Ok(entity),
            None if self.destroyed => Err(lifecycle::violation(A::NAME, Rejection::Destroyed)),
            None => Err(lifecycle::violation(A::NAME, Rejection::NotFound)),
        }
    }

    /// Whether the entity has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Number of durably stored events.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Events applied but not yet stored.
    #[must_use]
    pub fn unpublished_events(&self) -> &[Event<A::Event>] {
        &self.unpublished
    }

    /// The metadata factory for new events.
    #[must_use]
    pub fn context(&self) -> &EventContext {
        &self.context
    }

    /// The aggregate id.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::InvariantViolation` if the id comes from the
    /// entity and there is no entity yet.
    pub fn id(&self) -> Result<String, EventStoreError> {
        match &self.id {
            IdSource::Fixed(id) => Ok(id.clone()),
            IdSource::Entity => self.entity.as_ref().map(Aggregate::id).ok_or_else(|| {
                EventStoreError::InvariantViolation(format!(
                    "{} id is not known before its first event",
                    A::NAME
                ))
            }),
        }
    }

    /// The aggregate's own stream name.
    ///
    /// # Errors
    ///
    /// As [`AggregateRoot::id`].
    pub fn stream_name(&self) -> Result<String, EventStoreError> {
        Ok(stream_name_for(A::NAME, &self.id()?))
    }

    fn is_unresolved(&self) -> bool {
        matches!(self.id, IdSource::Entity) && self.entity.is_none()
    }

    /// Materializes `init`, reduces it over the entity and records it as
    /// unpublished. On error the entity and the unpublished buffer are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns the reducer's error.
    pub fn apply_event(
        &mut self,
        init: impl Into<EventInit<A::Event>>,
    ) -> Result<&Event<A::Event>, EventStoreError> {
        let init = init.into();
        let event = Event::new(init.data, self.context.metadata().merge(init.metadata));
        self.reduce(&event)?;
        self.unpublished.push(event);
        Ok(&self.unpublished[self.unpublished.len() - 1])
    }

    fn reduce(&mut self, event: &Event<A::Event>) -> Result<(), EventStoreError> {
        if self.destroyed {
            return Err(lifecycle::violation(A::NAME, Rejection::Destroyed));
        }
        let next = A::apply(self.entity.as_ref(), event)?;
        let pin = matches!(self.id, IdSource::Entity);
        if let Some(entity) = next.as_ref().filter(|_| pin) {
            self.id = IdSource::Fixed(entity.id());
        }
        self.destroyed = self.entity.is_some() && next.is_none();
        self.entity = next;
        Ok(())
    }

    fn replay(&mut self, event: &Event<A::Event>) -> Result<(), EventStoreError> {
        self.reduce(event)?;
        self.version += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.entity = None;
        self.destroyed = false;
        self.version = 0;
        self.unpublished.clear();
    }
}

impl<A: Aggregate + fmt::Debug> fmt::Debug for AggregateRoot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("id", &self.id)
            .field("entity", &self.entity)
            .field("destroyed", &self.destroyed)
            .field("version", &self.version)
            .field("unpublished", &self.unpublished.len())
            .finish_non_exhaustive()
    }
}

impl<R, B> EventStore<R, B>
where
    R: Repository,
    B: Broker<R::Db>,
{
    /// Rebuilds `root` by replaying its own stream.
    ///
    /// A root whose id comes from an entity it does not have yet is a new
    /// stream: it is reset to version 0 without reading anything.
    ///
    /// # Errors
    ///
    /// Returns repository, decoding or reducer errors.
    pub async fn load_aggregate<A: Aggregate>(
        &self,
        db: &R::Db,
        root: &mut AggregateRoot<A>,
    ) -> Result<(), EventStoreError> {
        if root.is_unresolved() {
            root.reset();
            return Ok(());
        }
        let stream_name = root.stream_name()?;
        self.load_aggregate_from(db, root, &stream_name).await
    }

    /// Rebuilds `root` by replaying `stream_name`. Any previous state and
    /// unpublished events are discarded first.
    ///
    /// # Errors
    ///
    /// Returns repository, decoding or reducer errors.
    #[tracing::instrument(skip(self, db, root), fields(aggregate = A::NAME))]
    pub async fn load_aggregate_from<A: Aggregate>(
        &self,
        db: &R::Db,
        root: &mut AggregateRoot<A>,
        stream_name: &str,
    ) -> Result<(), EventStoreError> {
        root.reset();
        self.read::<A::Event>()
            .stream(stream_name)
            .for_each(db, |event| root.replay(&event))
            .await?;
        tracing::debug!(version = root.version, "aggregate loaded");
        Ok(())
    }

    /// Publishes `root`'s unpublished events to its own stream.
    ///
    /// # Errors
    ///
    /// As [`EventStore::store_aggregate_to`].
    pub async fn store_aggregate<A: Aggregate>(
        &self,
        db: &R::Db,
        root: &mut AggregateRoot<A>,
    ) -> Result<(), EventStoreError> {
        if root.unpublished.is_empty() {
            return Ok(());
        }
        let stream_name = root.stream_name()?;
        self.store_aggregate_to(db, root, &stream_name).await
    }

    /// Publishes `root`'s unpublished events to `stream_name`, expecting the
    /// stream to still be at the version captured at load. On success the
    /// version advances by the number of events and the buffer is cleared.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::ConcurrencyConflict` if another writer
    /// advanced the stream, or any publish error. On error `root` is
    /// unchanged.
    #[tracing::instrument(skip(self, db, root), fields(aggregate = A::NAME))]
    pub async fn store_aggregate_to<A: Aggregate>(
        &self,
        db: &R::Db,
        root: &mut AggregateRoot<A>,
        stream_name: &str,
    ) -> Result<(), EventStoreError> {
        if root.unpublished.is_empty() {
            return Ok(());
        }
        self.publish_expected(
            db,
            &root.unpublished,
            stream_name,
            ExpectedVersion::Exact(root.version),
        )
        .await?;
        root.version += root.unpublished.len() as u64;
        root.unpublished.clear();
        tracing::debug!(version = root.version, "aggregate stored");
        Ok(())
    }

    /// Loads `root`, runs `command` against it, and stores the result.
    ///
    /// # Errors
    ///
    /// Returns the first load, command or store error; nothing is stored if
    /// `command` fails.
    pub async fn with_aggregate<A, F>(
        &self,
        db: &R::Db,
        root: &mut AggregateRoot<A>,
        command: F,
    ) -> Result<(), EventStoreError>
    where
        A: Aggregate,
        F: FnOnce(&mut AggregateRoot<A>) -> Result<(), EventStoreError> + Send,
    {
        self.load_aggregate(db, root).await?;
        command(root)?;
        self.store_aggregate(db, root).await
    }
}
