//! Lazy, paginated event queries.
//!
//! A [`Specification`] describes a read (stream, event types, event id,
//! offset, limit) and resolves it only when iterated. Iteration fetches fixed
//! size pages from the [`Repository`] and yields events one at a time in
//! append order, so memory stays bounded by the page size however long the
//! stream is. The resulting stream is single-pass: build a fresh
//! specification for every logical read.

use std::collections::VecDeque;
use std::marker::PhantomData;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::event::{DomainEvent, Event};
use crate::repository::{EventFilter, Repository, StoredEvent};

/// Fluent query descriptor bound to a repository.
///
/// `P` is the payload type events are decoded into.
pub struct Specification<'a, R: Repository, P> {
    repository: &'a R,
    filter: EventFilter,
    offset: u64,
    limit: Option<u64>,
    page_size: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<'a, R: Repository, P> Specification<'a, R, P> {
    /// Creates an unrestricted read of the global log.
    #[must_use]
    pub fn new(repository: &'a R) -> Self {
        Self {
            repository,
            filter: EventFilter::default(),
            offset: 0,
            limit: None,
            page_size: repository.page_size().max(1),
            _payload: PhantomData,
        }
    }

    /// Restricts the read to one stream, in link order.
    #[must_use]
    pub fn stream(mut self, stream_name: impl Into<String>) -> Self {
        self.filter.stream_name = Some(stream_name.into());
        self
    }

    /// Restricts the read to the given event types.
    #[must_use]
    pub fn of_type<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.event_types = Some(event_types.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the read to a single event.
    #[must_use]
    pub fn with_id(mut self, event_id: Uuid) -> Self {
        self.filter.event_id = Some(event_id);
        self
    }

    /// Yields at most `limit` events.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching events.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Overrides the repository's page size for this read.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The filter this specification resolves to.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Iterates the matching events in storage form.
    pub fn records(self, db: &'a R::Db) -> BoxStream<'a, Result<StoredEvent, EventStoreError>> {
        let cursor = PageCursor {
            repository: self.repository,
            db,
            filter: self.filter,
            next_offset: self.offset,
            limit: self.limit,
            page_size: self.page_size,
            page: VecDeque::new(),
            yielded: 0,
            exhausted: false,
        };
        stream::try_unfold(cursor, PageCursor::advance).boxed()
    }

    /// Counts the events iteration would yield, honoring offset and limit.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError` if the repository count fails.
    pub async fn count(self, db: &'a R::Db) -> Result<u64, EventStoreError> {
        let total = self.repository.count(db, &self.filter).await?;
        let available = total.saturating_sub(self.offset);
        Ok(self.limit.map_or(available, |limit| available.min(limit)))
    }
}

impl<'a, R: Repository, P: DomainEvent> Specification<'a, R, P> {
    /// Iterates the matching events decoded into `P`.
    pub fn events(self, db: &'a R::Db) -> BoxStream<'a, Result<Event<P>, EventStoreError>> {
        self.records(db)
            .and_then(|stored| futures::future::ready(Event::from_stored(&stored)))
            .boxed()
    }

    /// Calls `f` with each event in order.
    ///
    /// # Errors
    ///
    /// Returns the first repository, decoding or callback error.
    pub async fn for_each<F>(self, db: &'a R::Db, mut f: F) -> Result<(), EventStoreError>
    where
        F: FnMut(Event<P>) -> Result<(), EventStoreError> + Send,
    {
        let mut events = self.events(db);
        while let Some(event) = events.try_next().await? {
            f(event)?;
        }
        Ok(())
    }

    /// Maps each event in order and collects the results.
    ///
    /// # Errors
    ///
    /// Returns the first repository, decoding or callback error.
    pub async fn map<T, F>(self, db: &'a R::Db, mut f: F) -> Result<Vec<T>, EventStoreError>
    where
        T: Send,
        F: FnMut(Event<P>) -> Result<T, EventStoreError> + Send,
    {
        let mut out = Vec::new();
        let mut events = self.events(db);
        while let Some(event) = events.try_next().await? {
            out.push(f(event)?);
        }
        Ok(out)
    }

    /// Folds the events in order, starting from `init`.
    ///
    /// # Errors
    ///
    /// Returns the first repository, decoding or reducer error.
    pub async fn reduce<S, F>(self, db: &'a R::Db, init: S, mut f: F) -> Result<S, EventStoreError>
    where
        S: Send,
        F: FnMut(S, Event<P>) -> Result<S, EventStoreError> + Send,
    {
        let mut state = init;
        let mut events = self.events(db);
        while let Some(event) = events.try_next().await? {
            state = f(state, event)?;
        }
        Ok(state)
    }

    /// Collects every matching event.
    ///
    /// # Errors
    ///
    /// Returns the first repository or decoding error.
    pub async fn to_vec(self, db: &'a R::Db) -> Result<Vec<Event<P>>, EventStoreError> {
        self.events(db).try_collect().await
    }

    /// Returns the first matching event.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::NotFound` if nothing matches.
    pub async fn one(self, db: &'a R::Db) -> Result<Event<P>, EventStoreError> {
        let description = format!("{:?}", self.filter);
        self.with_limit(1)
            .events(db)
            .try_next()
            .await?
            .ok_or_else(|| EventStoreError::NotFound(format!("no event matches {description}")))
    }
}

/// Iteration state: the current page plus where the next one starts.
struct PageCursor<'a, R: Repository> {
    repository: &'a R,
    db: &'a R::Db,
    filter: EventFilter,
    next_offset: u64,
    limit: Option<u64>,
    page_size: u64,
    page: VecDeque<StoredEvent>,
    yielded: u64,
    exhausted: bool,
}

impl<'a, R: Repository> PageCursor<'a, R> {
    async fn advance(mut self) -> Result<Option<(StoredEvent, Self)>, EventStoreError> {
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            return Ok(None);
        }

        if self.page.is_empty() {
            if self.exhausted {
                return Ok(None);
            }
            let requested = self.limit.map_or(self.page_size, |limit| {
                (limit - self.yielded).min(self.page_size)
            });
            let page = self
                .repository
                .read_page(self.db, &self.filter, self.next_offset, requested)
                .await?;
            let fetched = page.len() as u64;
            tracing::trace!(
                offset = self.next_offset,
                requested,
                fetched,
                "fetched event page"
            );
            self.next_offset += fetched;
            self.exhausted = fetched < requested;
            self.page = page.into();
        }

        let Some(event) = self.page.pop_front() else {
            return Ok(None);
        };
        self.yielded += 1;
        Ok(Some((event, self)))
    }
}
