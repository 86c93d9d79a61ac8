//! Repository contract: the durable side of the event log.
//!
//! The engine only talks to storage through [`Repository`]. Every call takes
//! an explicit unit-of-work handle (`Repository::Db`) so that an append and
//! the subscriber writes it triggers share one transaction visibly, in the
//! signatures, rather than through ambient state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::event::EventMetadata;

/// Page size used by readers unless the repository or caller overrides it.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Stored representation of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub data: serde_json::Value,
    /// Event metadata.
    pub metadata: EventMetadata,
}

/// Which events a read or count selects.
///
/// Without a stream name the global log is read in append order; with one,
/// the stream is read in link order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Restricts to members of this stream.
    pub stream_name: Option<String>,
    /// Restricts to these event types. An empty list matches nothing.
    pub event_types: Option<Vec<String>>,
    /// Restricts to a single event.
    pub event_id: Option<Uuid>,
}

impl EventFilter {
    /// Returns `true` if `event` passes the type and id restrictions.
    /// Stream membership is the repository's concern.
    #[must_use]
    pub fn matches(&self, event: &StoredEvent) -> bool {
        let type_matches = self
            .event_types
            .as_ref()
            .is_none_or(|types| types.iter().any(|t| *t == event.event_type));
        let id_matches = self.event_id.is_none_or(|id| id == event.event_id);
        type_matches && id_matches
    }
}

/// Stream version a writer expects to find when appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append regardless of the current version.
    Any,
    /// Append only if the stream's version equals this value.
    Exact(u64),
}

impl ExpectedVersion {
    /// Checks `actual` against the expectation.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::ConcurrencyConflict` on mismatch.
    pub fn check(self, stream_name: &str, actual: u64) -> Result<(), EventStoreError> {
        match self {
            Self::Exact(expected) if expected != actual => {
                Err(EventStoreError::ConcurrencyConflict {
                    stream: stream_name.to_owned(),
                    expected,
                    actual,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Stream version (highest position) after the append.
    pub stream_version: u64,
}

/// Whether linking skips event ids already present in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// Already-linked ids are skipped, making the link idempotent.
    Enforce,
    /// The caller guarantees the ids are not yet linked.
    Skip,
}

/// Durable event log with named streams.
///
/// Stream positions start at 1 and increase by one per appended or linked
/// event. A stream's version is its highest position, 0 when empty.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Unit-of-work handle threaded through every call.
    type Db: Send + Sync + 'static;

    /// Appends `events` to the global log and links them, in order, at the
    /// end of `stream_name`. An empty batch is a no-op.
    async fn append_to_stream(
        &self,
        db: &Self::Db,
        events: &[StoredEvent],
        stream_name: &str,
        expected_version: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError>;

    /// Links already-stored events at the end of `stream_name`.
    ///
    /// Returns `EventStoreError::NotFound` if an id is not in the log.
    async fn link_to_stream(
        &self,
        db: &Self::Db,
        event_ids: &[Uuid],
        stream_name: &str,
        duplicates: DuplicateCheck,
    ) -> Result<(), EventStoreError>;

    /// Removes every membership record of `stream_name`. Events stay in the
    /// log and in any other stream.
    async fn delete_stream(&self, db: &Self::Db, stream_name: &str) -> Result<(), EventStoreError>;

    /// Names of every stream the event belongs to, sorted.
    async fn streams_of(&self, db: &Self::Db, event_id: Uuid) -> Result<Vec<String>, EventStoreError>;

    /// Reads up to `limit` matching events after skipping `offset`, in
    /// stream order (or global order when no stream is set).
    async fn read_page(
        &self,
        db: &Self::Db,
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Counts matching events.
    async fn count(&self, db: &Self::Db, filter: &EventFilter) -> Result<u64, EventStoreError>;

    /// Returns `true` if the event is a member of the stream.
    async fn event_in_stream(
        &self,
        db: &Self::Db,
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<bool, EventStoreError>;

    /// The event's position within the stream, if it is a member.
    async fn position_in_stream(
        &self,
        db: &Self::Db,
        event_id: Uuid,
        stream_name: &str,
    ) -> Result<Option<u64>, EventStoreError>;

    /// The stream's current version.
    async fn stream_version(&self, db: &Self::Db, stream_name: &str) -> Result<u64, EventStoreError>;

    /// Page size readers use against this repository.
    fn page_size(&self) -> u64 {
        DEFAULT_PAGE_SIZE
    }
}
