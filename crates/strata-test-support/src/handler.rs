//! Test broker handlers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use strata_core::broker::EventHandler;
use strata_core::error::EventStoreError;
use strata_core::repository::StoredEvent;

/// A handler that logs `start:<type>` and `end:<type>` around an optional
/// delay. Clones share the same log, so one log can observe several handlers.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    name: Option<&'static str>,
    delay: Option<Duration>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    /// A handler with its own empty log and no delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes log entries with `name`.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Sleeps for `delay` between the start and end entries.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A handler writing into the same log as `self`.
    #[must_use]
    pub fn sharing_log(&self) -> Self {
        Self {
            name: None,
            delay: None,
            log: Arc::clone(&self.log),
        }
    }

    /// Returns a snapshot of the log.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Returns the event types seen, one per completed invocation.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn handled_types(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| {
                entry
                    .rsplit_once("end:")
                    .map(|(_, event_type)| event_type.to_owned())
            })
            .collect()
    }

    fn record(&self, phase: &str, event: &StoredEvent) {
        let entry = match self.name {
            Some(name) => format!("{name}:{phase}:{}", event.event_type),
            None => format!("{phase}:{}", event.event_type),
        };
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl<Db: Send + Sync + 'static> EventHandler<Db> for RecordingHandler {
    async fn handle(&self, _db: &Db, event: &StoredEvent) -> Result<(), EventStoreError> {
        self.record("start", event);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.record("end", event);
        Ok(())
    }
}

/// A handler that always fails with `EventStoreError::Handler`.
#[derive(Debug, Clone, Copy)]
pub struct FailingHandler;

#[async_trait]
impl<Db: Send + Sync + 'static> EventHandler<Db> for FailingHandler {
    async fn handle(&self, _db: &Db, event: &StoredEvent) -> Result<(), EventStoreError> {
        Err(EventStoreError::Handler(format!(
            "projection failed on {}",
            event.event_type
        )))
    }
}
