//! `Repository` doubles for error paths and paging.

use std::sync::Mutex;

use async_trait::async_trait;
use strata_core::error::EventStoreError;
use strata_core::memory::InMemoryRepository;
use strata_core::repository::{
    AppendResult, DuplicateCheck, EventFilter, ExpectedVersion, Repository, StoredEvent,
};
use uuid::Uuid;

fn refused<T>() -> Result<T, EventStoreError> {
    Err(EventStoreError::Infrastructure("connection refused".into()))
}

/// A repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingRepository;

#[async_trait]
impl Repository for FailingRepository {
    type Db = ();

    async fn append_to_stream(
        &self,
        _db: &(),
        _events: &[StoredEvent],
        _stream_name: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        refused()
    }

    async fn link_to_stream(
        &self,
        _db: &(),
        _event_ids: &[Uuid],
        _stream_name: &str,
        _duplicates: DuplicateCheck,
    ) -> Result<(), EventStoreError> {
        refused()
    }

    async fn delete_stream(&self, _db: &(), _stream_name: &str) -> Result<(), EventStoreError> {
        refused()
    }

    async fn streams_of(&self, _db: &(), _event_id: Uuid) -> Result<Vec<String>, EventStoreError> {
        refused()
    }

    async fn read_page(
        &self,
        _db: &(),
        _filter: &EventFilter,
        _offset: u64,
        _limit: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        refused()
    }

    async fn count(&self, _db: &(), _filter: &EventFilter) -> Result<u64, EventStoreError> {
        refused()
    }

    async fn event_in_stream(
        &self,
        _db: &(),
        _event_id: Uuid,
        _stream_name: &str,
    ) -> Result<bool, EventStoreError> {
        refused()
    }

    async fn position_in_stream(
        &self,
        _db: &(),
        _event_id: Uuid,
        _stream_name: &str,
    ) -> Result<Option<u64>, EventStoreError> {
        refused()
    }

    async fn stream_version(&self, _db: &(), _stream_name: &str) -> Result<u64, EventStoreError> {
        refused()
    }
}

/// An in-memory repository that records every `read_page` call as an
/// `(offset, limit)` pair.
#[derive(Debug)]
pub struct PageCountingRepository {
    inner: InMemoryRepository,
    pages: Mutex<Vec<(u64, u64)>>,
}

impl PageCountingRepository {
    /// Wraps an empty in-memory repository with the given page size.
    #[must_use]
    pub fn with_page_size(page_size: u64) -> Self {
        Self {
            inner: InMemoryRepository::new().with_page_size(page_size),
            pages: Mutex::new(Vec::new()),
        }
    }

    /// Returns every `(offset, limit)` requested so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn pages_requested(&self) -> Vec<(u64, u64)> {
        self.pages.lock().unwrap().clone()
    }

    /// Forgets recorded page requests.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn reset(&self) {
        self.pages.lock().unwrap().clear();
    }
}

#[async_trait]
impl Repository for PageCountingRepository {
    type Db = ();

    async fn append_to_stream(
        &self,
        db: &(),
        events: &[StoredEvent],
        stream_name: &str,
        expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        self.inner
            .append_to_stream(db, events, stream_name, expected_version)
            .await
    }

    async fn link_to_stream(
        &self,
        db: &(),
        event_ids: &[Uuid],
        stream_name: &str,
        duplicates: DuplicateCheck,
    ) -> Result<(), EventStoreError> {
        self.inner
            .link_to_stream(db, event_ids, stream_name, duplicates)
            .await
    }

    async fn delete_stream(&self, db: &(), stream_name: &str) -> Result<(), EventStoreError> {
        self.inner.delete_stream(db, stream_name).await
    }

    async fn streams_of(&self, db: &(), event_id: Uuid) -> Result<Vec<String>, EventStoreError> {
        self.inner.streams_of(db, event_id).await
    }

    async fn read_page(
        &self,
        db: &(),
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.pages.lock().unwrap().push((offset, limit));
        self.inner.read_page(db, filter, offset, limit).await
    }

    async fn count(&self, db: &(), filter: &EventFilter) -> Result<u64, EventStoreError> {
        self.inner.count(db, filter).await
    }

    async fn event_in_stream(
        &self,
        db: &(),
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<bool, EventStoreError> {
        self.inner.event_in_stream(db, event_id, stream_name).await
    }

    async fn position_in_stream(
        &self,
        db: &(),
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<u64>, EventStoreError> {
        self.inner.position_in_stream(db, event_id, stream_name).await
    }

    async fn stream_version(&self, db: &(), stream_name: &str) -> Result<u64, EventStoreError> {
        self.inner.stream_version(db, stream_name).await
    }

    fn page_size(&self) -> u64 {
        self.inner.page_size()
    }
}
