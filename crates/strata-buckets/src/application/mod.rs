//! Application layer for the Buckets context.

pub mod command_handlers;
pub mod query_handlers;
pub mod read_model;
