//! Shared test doubles and utilities for the Strata event store.

mod clock;
mod handler;
mod repository;

pub use clock::{FixedClock, fixed_context, test_instant};
pub use handler::{FailingHandler, RecordingHandler};
pub use repository::{FailingRepository, PageCountingRepository};
