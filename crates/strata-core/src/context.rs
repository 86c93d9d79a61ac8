//! Command context: who is acting, when, and under which correlation.
//!
//! An [`EventContext`] is the metadata factory an aggregate root uses when it
//! materializes new events. Time comes from an injected [`Clock`] so replays
//! and tests stay deterministic.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::EventMetadata;

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trait that all commands implement.
pub trait Command: Send + Sync + fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// The user issuing the command, if any.
    fn actor(&self) -> Option<Uuid>;
}

/// Default metadata source for events emitted while handling one command.
#[derive(Clone)]
pub struct EventContext {
    actor: Option<Uuid>,
    correlation_id: Option<Uuid>,
    clock: Arc<dyn Clock>,
}

impl EventContext {
    /// Creates a context with no actor and no correlation id.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            actor: None,
            correlation_id: None,
            clock,
        }
    }

    /// Creates a context carrying the command's actor and correlation id.
    #[must_use]
    pub fn for_command(command: &dyn Command, clock: Arc<dyn Clock>) -> Self {
        Self {
            actor: command.actor(),
            correlation_id: Some(command.correlation_id()),
            clock,
        }
    }

    /// Sets the acting user.
    #[must_use]
    pub fn with_actor(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// The acting user, if any.
    #[must_use]
    pub fn actor(&self) -> Option<Uuid> {
        self.actor
    }

    /// The correlation id, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    /// Builds the default metadata for a new event.
    #[must_use]
    pub fn metadata(&self) -> EventMetadata {
        EventMetadata {
            actor: self.actor,
            occurred_at: self.clock.now(),
            correlation_id: self.correlation_id,
            causation_id: self.correlation_id,
            link_to: None,
        }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("actor", &self.actor)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
