//! Strata Core: an embedded event-sourcing engine.
//!
//! This crate defines the event log model, the repository and broker
//! contracts the engine depends on, and the pieces composed on top of them:
//! the paginated [`Specification`](specification::Specification) reader, the
//! [`EventStore`](store::EventStore) façade, reducer-backed
//! [`AggregateRoot`](aggregate::AggregateRoot)s and on-demand
//! [`Projection`](projection::Projection)s. It contains no infrastructure
//! code; storage backends implement [`Repository`](repository::Repository).

pub mod aggregate;
pub mod broker;
pub mod context;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod memory;
pub mod projection;
pub mod repository;
pub mod specification;
pub mod store;
