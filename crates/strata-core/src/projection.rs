//! On-demand folds over a single stream.
//!
//! A [`Projection`] is declared once with [`create_projection`] and a set of
//! `when` clauses, then evaluated with [`Projection::run`]. Only the
//! registered event types are read, so a projection over a busy stream pays
//! for the events it cares about and nothing else.

use std::fmt;

use crate::broker::Broker;
use crate::error::EventStoreError;
use crate::event::{DomainEvent, Event};
use crate::repository::Repository;
use crate::store::EventStore;

type Reducer<S, P> = Box<dyn Fn(S, &Event<P>) -> Result<S, EventStoreError> + Send + Sync>;

/// A declarative fold of one stream into a value of type `S`.
pub struct Projection<S, P> {
    stream_name: String,
    init: Box<dyn Fn() -> S + Send + Sync>,
    clauses: Vec<(Vec<String>, Reducer<S, P>)>,
}

/// Starts a projection over `stream_name` seeded by `init`.
pub fn create_projection<S, P>(
    stream_name: impl Into<String>,
    init: impl Fn() -> S + Send + Sync + 'static,
) -> Projection<S, P>
where
    S: Send + 'static,
    P: DomainEvent,
{
    Projection {
        stream_name: stream_name.into(),
        init: Box::new(init),
        clauses: Vec::new(),
    }
}

impl<S, P> Projection<S, P>
where
    S: Send + 'static,
    P: DomainEvent,
{
    /// Adds a reducer for the given event types. When several clauses match
    /// one event they run in registration order.
    #[must_use]
    pub fn when(
        mut self,
        event_types: &[&str],
        reducer: impl Fn(S, &Event<P>) -> Result<S, EventStoreError> + Send + Sync + 'static,
    ) -> Self {
        let types = event_types.iter().map(|t| (*t).to_owned()).collect();
        self.clauses.push((types, Box::new(reducer)));
        self
    }

    /// The stream this projection folds.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Every event type some clause handles, deduplicated, in registration
    /// order.
    #[must_use]
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for event_type in self.clauses.iter().flat_map(|(types, _)| types) {
            if !types.contains(event_type) {
                types.push(event_type.clone());
            }
        }
        types
    }

    /// Replays the registered event types of the stream from `init()`.
    ///
    /// # Errors
    ///
    /// Returns repository, decoding or reducer errors.
    #[tracing::instrument(skip(self, store, db), fields(stream = %self.stream_name))]
    pub async fn run<R, B>(&self, store: &EventStore<R, B>, db: &R::Db) -> Result<S, EventStoreError>
    where
        R: Repository,
        B: Broker<R::Db>,
    {
        let clauses = &self.clauses;
        store
            .read::<P>()
            .stream(self.stream_name.as_str())
            .of_type(self.registered_types())
            .reduce(db, (self.init)(), |state, event| {
                clauses
                    .iter()
                    .filter(|(types, _)| types.iter().any(|t| t == event.event_type()))
                    .try_fold(state, |state, (_, reducer)| reducer(state, &event))
            })
            .await
    }
}

impl<S, P> fmt::Debug for Projection<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("stream_name", &self.stream_name)
            .field("clauses", &self.clauses.len())
            .finish_non_exhaustive()
    }
}
