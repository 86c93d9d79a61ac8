//! `PostgreSQL` backend for the Strata event store.
//!
//! [`PgRepository`](pg_repository::PgRepository) implements the engine's
//! `Repository` contract over two tables (the global `events` log and
//! `stream_events` membership). Every call runs inside a caller-owned
//! [`PgUnitOfWork`](unit_of_work::PgUnitOfWork), so an append and the
//! subscriber writes it triggers commit or roll back together.

pub mod config;
pub mod pg_repository;
pub mod schema;
pub mod unit_of_work;
