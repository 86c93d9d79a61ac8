//! In-memory repository for tests, examples and single-process tools.
//!
//! [`InMemoryRepository`] keeps the global log and stream membership behind
//! one lock. It has no transactions: its unit of work is `()`, and every call
//! is applied immediately.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::repository::{
    AppendResult, DEFAULT_PAGE_SIZE, DuplicateCheck, EventFilter, ExpectedVersion, Repository,
    StoredEvent,
};

/// Thread-safe in-memory [`Repository`].
#[derive(Debug, Clone)]
pub struct InMemoryRepository {
    inner: Arc<RwLock<Inner>>,
    page_size: u64,
}

#[derive(Debug, Default)]
struct Inner {
    /// Global log in append order.
    log: Vec<StoredEvent>,
    /// Event id to index in `log`.
    index: HashMap<Uuid, usize>,
    /// Stream name to member ids; position is index + 1.
    streams: HashMap<String, Vec<Uuid>>,
}

impl Inner {
    fn version(&self, stream_name: &str) -> u64 {
        self.streams
            .get(stream_name)
            .map_or(0, |members| members.len() as u64)
    }

    fn matching(&self, filter: &EventFilter) -> Vec<&StoredEvent> {
        match &filter.stream_name {
            Some(stream_name) => self
                .streams
                .get(stream_name)
                .into_iter()
                .flatten()
                .filter_map(|id| self.index.get(id).map(|&i| &self.log[i]))
                .filter(|event| filter.matches(event))
                .collect(),
            None => self.log.iter().filter(|event| filter.matches(event)).collect(),
        }
    }
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size readers use against this repository.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of events in the global log.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if the lock is poisoned.
    pub fn log_len(&self) -> Result<usize, EventStoreError> {
        Ok(self.read()?.log.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, EventStoreError> {
        self.inner.read().map_err(|_| {
            EventStoreError::Infrastructure("in-memory repository lock poisoned".into())
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, EventStoreError> {
        self.inner.write().map_err(|_| {
            EventStoreError::Infrastructure("in-memory repository lock poisoned".into())
        })
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    type Db = ();

    async fn append_to_stream(
        &self,
        _db: &(),
        events: &[StoredEvent],
        stream_name: &str,
        expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        let mut inner = self.write()?;
        let current = inner.version(stream_name);
        expected_version.check(stream_name, current)?;

        let mut batch = HashSet::with_capacity(events.len());
        for event in events {
            if inner.index.contains_key(&event.event_id) || !batch.insert(event.event_id) {
                return Err(EventStoreError::Infrastructure(format!(
                    "duplicate event id {}",
                    event.event_id
                )));
            }
        }

        for event in events {
            let position = inner.log.len();
            inner.index.insert(event.event_id, position);
            inner.log.push(event.clone());
        }
        let members = inner.streams.entry(stream_name.to_owned()).or_default();
        members.extend(events.iter().map(|event| event.event_id));
        let stream_version = members.len() as u64;
        drop(inner);

        tracing::debug!(stream_name, appended = events.len(), stream_version, "events appended");
        Ok(AppendResult { stream_version })
    }

    async fn link_to_stream(
        &self,
        _db: &(),
        event_ids: &[Uuid],
        stream_name: &str,
        duplicates: DuplicateCheck,
    ) -> Result<(), EventStoreError> {
        let mut inner = self.write()?;
        if let Some(missing) = event_ids.iter().find(|id| !inner.index.contains_key(id)) {
            return Err(EventStoreError::NotFound(format!("event {missing}")));
        }

        let members = inner.streams.entry(stream_name.to_owned()).or_default();
        for id in event_ids {
            if duplicates == DuplicateCheck::Enforce && members.contains(id) {
                continue;
            }
            members.push(*id);
        }
        Ok(())
    }

    async fn delete_stream(&self, _db: &(), stream_name: &str) -> Result<(), EventStoreError> {
        self.write()?.streams.remove(stream_name);
        Ok(())
    }

    async fn streams_of(&self, _db: &(), event_id: Uuid) -> Result<Vec<String>, EventStoreError> {
        let inner = self.read()?;
        let mut names: Vec<String> = inner
            .streams
            .iter()
            .filter(|(_, members)| members.contains(&event_id))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn read_page(
        &self,
        _db: &(),
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.read()?;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(inner
            .matching(filter)
            .into_iter()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn count(&self, _db: &(), filter: &EventFilter) -> Result<u64, EventStoreError> {
        Ok(self.read()?.matching(filter).len() as u64)
    }

    async fn event_in_stream(
        &self,
        _db: &(),
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<bool, EventStoreError> {
        Ok(self
            .read()?
            .streams
            .get(stream_name)
            .is_some_and(|members| members.contains(&event_id)))
    }

    async fn position_in_stream(
        &self,
        _db: &(),
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<u64>, EventStoreError> {
        Ok(self.read()?.streams.get(stream_name).and_then(|members| {
            members
                .iter()
                .position(|id| *id == event_id)
                .map(|index| index as u64 + 1)
        }))
    }

    async fn stream_version(&self, _db: &(), stream_name: &str) -> Result<u64, EventStoreError> {
        Ok(self.read()?.version(stream_name))
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }
}
