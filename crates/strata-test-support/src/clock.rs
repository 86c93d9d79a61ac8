//! Deterministic `Clock` implementation for tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use strata_core::context::{Clock, EventContext};
use uuid::Uuid;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The instant every fixed test clock reports by default.
///
/// # Panics
///
/// Panics only if chrono rejects the constant timestamp.
#[must_use]
pub fn test_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// An `EventContext` stamped at [`test_instant`] acting as `actor`.
#[must_use]
pub fn fixed_context(actor: Uuid) -> EventContext {
    EventContext::new(Arc::new(FixedClock(test_instant())))
        .with_actor(actor)
        .with_correlation_id(Uuid::new_v4())
}
