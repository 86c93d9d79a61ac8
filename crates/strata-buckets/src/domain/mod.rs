//! Domain layer for the Buckets context.

pub mod aggregates;
pub mod commands;
pub mod events;
