//! The event store façade.
//!
//! [`EventStore`] is the single entry point for mutating and querying the log.
//! It composes a durable [`Repository`] with a live [`Broker`]: `publish`
//! appends first and only then notifies subscribers, one event at a time and in
//! order. Whatever `db` handle the caller passes is shared by both phases, so a
//! transactional repository makes the pair atomic; the engine itself does not
//! roll back an append when a handler fails.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::broker::{Broker, EventHandler, Subscription};
use crate::error::EventStoreError;
use crate::event::{DomainEvent, Event};
use crate::repository::{
    AppendResult, DuplicateCheck, ExpectedVersion, Repository, StoredEvent,
};
use crate::specification::Specification;

/// Repository + broker composition.
pub struct EventStore<R, B> {
    repository: Arc<R>,
    broker: Arc<B>,
}

impl<R, B> Clone for EventStore<R, B> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            broker: Arc::clone(&self.broker),
        }
    }
}

impl<R, B> std::fmt::Debug for EventStore<R, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore").finish_non_exhaustive()
    }
}

fn encode_all<P: DomainEvent>(events: &[Event<P>]) -> Result<Vec<StoredEvent>, EventStoreError> {
    events.iter().map(Event::to_stored).collect()
}

impl<R, B> EventStore<R, B>
where
    R: Repository,
    B: Broker<R::Db>,
{
    /// Creates a store over `repository` notifying through `broker`.
    #[must_use]
    pub fn new(repository: R, broker: B) -> Self {
        Self {
            repository: Arc::new(repository),
            broker: Arc::new(broker),
        }
    }

    /// The underlying repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// The underlying broker.
    #[must_use]
    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    /// Appends `events` to `stream_name`, then publishes each one to the
    /// broker in order.
    ///
    /// # Errors
    ///
    /// Returns the repository's error if the append fails (nothing is
    /// published), or the first handler error. Events appended before a
    /// handler failure are not rolled back by the store.
    pub async fn publish<P: DomainEvent>(
        &self,
        db: &R::Db,
        events: &[Event<P>],
        stream_name: &str,
    ) -> Result<AppendResult, EventStoreError> {
        self.publish_expected(db, events, stream_name, ExpectedVersion::Any)
            .await
    }

    /// [`EventStore::publish`] with an optimistic concurrency check.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::ConcurrencyConflict` if the stream is not at
    /// `expected_version`, otherwise as [`EventStore::publish`].
    #[tracing::instrument(skip(self, db, events), fields(event_count = events.len()))]
    pub async fn publish_expected<P: DomainEvent>(
        &self,
        db: &R::Db,
        events: &[Event<P>],
        stream_name: &str,
        expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        let stored = encode_all(events)?;
        let result = self
            .repository
            .append_to_stream(db, &stored, stream_name, expected_version)
            .await?;
        for event in &stored {
            self.broker.publish(db, event).await?;
        }
        tracing::debug!(stream_version = result.stream_version, "events published");
        Ok(result)
    }

    /// Appends `events` to `stream_name` without notifying subscribers.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn append<P: DomainEvent>(
        &self,
        db: &R::Db,
        events: &[Event<P>],
        stream_name: &str,
    ) -> Result<AppendResult, EventStoreError> {
        self.append_expected(db, events, stream_name, ExpectedVersion::Any)
            .await
    }

    /// [`EventStore::append`] with an optimistic concurrency check.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::ConcurrencyConflict` if the stream is not at
    /// `expected_version`, or the repository's error.
    #[tracing::instrument(skip(self, db, events), fields(event_count = events.len()))]
    pub async fn append_expected<P: DomainEvent>(
        &self,
        db: &R::Db,
        events: &[Event<P>],
        stream_name: &str,
        expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        let stored = encode_all(events)?;
        self.repository
            .append_to_stream(db, &stored, stream_name, expected_version)
            .await
    }

    /// Links stored events at the end of `stream_name`, skipping ids already
    /// linked there.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::NotFound` for an unknown event id, or the
    /// repository's error.
    #[tracing::instrument(skip(self, db, event_ids), fields(event_count = event_ids.len()))]
    pub async fn link(
        &self,
        db: &R::Db,
        event_ids: &[Uuid],
        stream_name: &str,
    ) -> Result<(), EventStoreError> {
        self.repository
            .link_to_stream(db, event_ids, stream_name, DuplicateCheck::Enforce)
            .await
    }

    /// Links stored events without checking for existing membership.
    ///
    /// # Errors
    ///
    /// As [`EventStore::link`]; a repository may also reject a duplicate.
    pub async fn link_unchecked(
        &self,
        db: &R::Db,
        event_ids: &[Uuid],
        stream_name: &str,
    ) -> Result<(), EventStoreError> {
        self.repository
            .link_to_stream(db, event_ids, stream_name, DuplicateCheck::Skip)
            .await
    }

    /// Starts a query over this store's repository.
    #[must_use]
    pub fn read<P: DomainEvent>(&self) -> Specification<'_, R, P> {
        Specification::new(self.repository.as_ref())
    }

    /// Removes stream membership. The events themselves stay in the log.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    #[tracing::instrument(skip(self, db))]
    pub async fn delete_stream(&self, db: &R::Db, stream_name: &str) -> Result<(), EventStoreError> {
        self.repository.delete_stream(db, stream_name).await?;
        tracing::debug!("stream deleted");
        Ok(())
    }

    /// Names of the streams an event belongs to.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn streams_of(&self, db: &R::Db, event_id: Uuid) -> Result<Vec<String>, EventStoreError> {
        self.repository.streams_of(db, event_id).await
    }

    /// Returns `true` if the event is linked into the stream.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn event_in_stream(
        &self,
        db: &R::Db,
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<bool, EventStoreError> {
        self.repository.event_in_stream(db, event_id, stream_name).await
    }

    /// The event's 1-based position in the stream.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn position_in_stream(
        &self,
        db: &R::Db,
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<u64>, EventStoreError> {
        self.repository.position_in_stream(db, event_id, stream_name).await
    }

    /// The stream's current version.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn stream_version(&self, db: &R::Db, stream_name: &str) -> Result<u64, EventStoreError> {
        self.repository.stream_version(db, stream_name).await
    }

    /// Registers a handler for the given event types.
    pub fn subscribe(
        &self,
        event_types: &[&str],
        handler: Arc<dyn EventHandler<R::Db>>,
    ) -> Subscription {
        self.broker.subscribe(event_types, handler)
    }

    /// Registers a handler for every event.
    pub fn subscribe_to_all(&self, handler: Arc<dyn EventHandler<R::Db>>) -> Subscription {
        self.broker.subscribe_to_all(handler)
    }

    /// Registers the subscriber that links events carrying
    /// `metadata.link_to` into that stream.
    pub fn enable_stream_linking(&self) -> Subscription
    where
        R: 'static,
    {
        self.broker.subscribe_to_all(Arc::new(LinkToStream {
            repository: Arc::clone(&self.repository),
        }))
    }

    /// A view of this store restricted to the event types of `P`.
    #[must_use]
    pub fn scope<P: DomainEvent>(&self) -> ScopedEventStore<'_, R, B, P> {
        ScopedEventStore {
            store: self,
            _events: PhantomData,
        }
    }
}

/// Catch-all subscriber that honours `metadata.link_to`.
struct LinkToStream<R> {
    repository: Arc<R>,
}

#[async_trait]
impl<R: Repository> EventHandler<R::Db> for LinkToStream<R> {
    async fn handle(&self, db: &R::Db, event: &StoredEvent) -> Result<(), EventStoreError> {
        let Some(stream_name) = &event.metadata.link_to else {
            return Ok(());
        };
        tracing::debug!(event_id = %event.event_id, %stream_name, "linking event");
        self.repository
            .link_to_stream(db, &[event.event_id], stream_name, DuplicateCheck::Enforce)
            .await
    }
}

/// The same store, narrowed to one sub-domain's event types.
///
/// Reads default to the types in `P::EVENT_TYPES`, so streams shared with
/// other sub-domains decode cleanly.
pub struct ScopedEventStore<'a, R, B, P> {
    store: &'a EventStore<R, B>,
    _events: PhantomData<fn() -> P>,
}

impl<'a, R, B, P> ScopedEventStore<'a, R, B, P>
where
    R: Repository,
    B: Broker<R::Db>,
    P: DomainEvent,
{
    /// The unscoped store.
    #[must_use]
    pub fn unscoped(&self) -> &'a EventStore<R, B> {
        self.store
    }

    /// See [`EventStore::publish`].
    ///
    /// # Errors
    ///
    /// As [`EventStore::publish`].
    pub async fn publish(
        &self,
        db: &R::Db,
        events: &[Event<P>],
        stream_name: &str,
    ) -> Result<AppendResult, EventStoreError> {
        self.store.publish(db, events, stream_name).await
    }

    /// See [`EventStore::append`].
    ///
    /// # Errors
    ///
    /// As [`EventStore::append`].
    pub async fn append(
        &self,
        db: &R::Db,
        events: &[Event<P>],
        stream_name: &str,
    ) -> Result<AppendResult, EventStoreError> {
        self.store.append(db, events, stream_name).await
    }

    /// See [`EventStore::link`].
    ///
    /// # Errors
    ///
    /// As [`EventStore::link`].
    pub async fn link(
        &self,
        db: &R::Db,
        event_ids: &[Uuid],
        stream_name: &str,
    ) -> Result<(), EventStoreError> {
        self.store.link(db, event_ids, stream_name).await
    }

    /// A query restricted to this scope's event types.
    #[must_use]
    pub fn read(&self) -> Specification<'a, R, P> {
        self.store.read::<P>().of_type(P::EVENT_TYPES.iter().copied())
    }

    /// See [`EventStore::delete_stream`].
    ///
    /// # Errors
    ///
    /// As [`EventStore::delete_stream`].
    pub async fn delete_stream(&self, db: &R::Db, stream_name: &str) -> Result<(), EventStoreError> {
        self.store.delete_stream(db, stream_name).await
    }

    /// Registers a handler for event types of this scope. Types outside the
    /// scope are ignored.
    pub fn subscribe(
        &self,
        event_types: &[&str],
        handler: Arc<dyn EventHandler<R::Db>>,
    ) -> Subscription {
        let in_scope: Vec<&str> = event_types
            .iter()
            .copied()
            .filter(|t| P::EVENT_TYPES.contains(t))
            .collect();
        self.store.subscribe(&in_scope, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::event::EventMetadata;
    use crate::event::tests::{NoteEvent, noted};
    use crate::memory::InMemoryRepository;
    use chrono::Utc;
    use std::sync::Mutex;

    type MemoryStore = EventStore<InMemoryRepository, InMemoryBroker<()>>;

    fn memory_store() -> MemoryStore {
        EventStore::new(InMemoryRepository::new(), InMemoryBroker::new())
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<Uuid>>);

    #[async_trait]
    impl EventHandler<()> for Seen {
        async fn handle(&self, _db: &(), event: &StoredEvent) -> Result<(), EventStoreError> {
            self.0.lock().unwrap().push(event.event_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_notifies_in_append_order() {
        // Arrange
        let store = memory_store();
        let seen = Arc::new(Seen::default());
        let _s = store.subscribe(&["Noted"], seen.clone());
        let events = vec![noted("a"), noted("b")];

        // Act
        let result = store.publish(&(), &events, "notes").await.unwrap();

        // Assert
        assert_eq!(result.stream_version, 2);
        assert_eq!(
            *seen.0.lock().unwrap(),
            vec![events[0].event_id, events[1].event_id]
        );
    }

    #[tokio::test]
    async fn test_append_does_not_notify() {
        let store = memory_store();
        let seen = Arc::new(Seen::default());
        let _s = store.subscribe_to_all(seen.clone());

        store.append(&(), &[noted("a")], "notes").await.unwrap();

        assert!(seen.0.lock().unwrap().is_empty());
        assert_eq!(store.stream_version(&(), "notes").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_publishes_nothing() {
        let store = memory_store();
        let seen = Arc::new(Seen::default());
        let _s = store.subscribe_to_all(seen.clone());

        let result = store
            .publish_expected(&(), &[noted("a")], "notes", ExpectedVersion::Exact(3))
            .await;

        assert!(matches!(result, Err(EventStoreError::ConcurrencyConflict { .. })));
        assert!(seen.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_linking_follows_link_to_metadata() {
        // Arrange
        let store = memory_store();
        let _linking = store.enable_stream_linking();
        let mut event = noted("shared");
        event.metadata = EventMetadata {
            link_to: Some("Board$b1".to_owned()),
            ..EventMetadata::at(Utc::now())
        };

        // Act
        store.publish(&(), &[event.clone()], "Note$n1").await.unwrap();

        // Assert
        assert_eq!(
            store.streams_of(&(), event.event_id).await.unwrap(),
            vec!["Board$b1".to_owned(), "Note$n1".to_owned()]
        );
        let linked = store
            .read::<NoteEvent>()
            .stream("Board$b1")
            .one(&())
            .await
            .unwrap();
        assert_eq!(linked.event_id, event.event_id);
    }

    #[tokio::test]
    async fn test_scoped_read_only_sees_scope_types() {
        let store = memory_store();
        store.append(&(), &[noted("a")], "notes").await.unwrap();
        let foreign = StoredEvent {
            event_id: Uuid::new_v4(),
            event_type: "SomethingElse".to_owned(),
            data: serde_json::json!({}),
            metadata: EventMetadata::at(Utc::now()),
        };
        store
            .repository()
            .append_to_stream(&(), &[foreign], "notes", ExpectedVersion::Any)
            .await
            .unwrap();

        let scoped = store.scope::<NoteEvent>().read().stream("notes").to_vec(&()).await;
        let unscoped = store.read::<NoteEvent>().stream("notes").to_vec(&()).await;

        assert_eq!(scoped.unwrap().len(), 1);
        assert!(matches!(unscoped, Err(EventStoreError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_scoped_subscribe_ignores_foreign_types() {
        let store = memory_store();
        let seen = Arc::new(Seen::default());

        let _s = store
            .scope::<NoteEvent>()
            .subscribe(&["Noted", "SomethingElse"], seen.clone());

        assert_eq!(store.broker().subscription_count(), 1);
    }
}
