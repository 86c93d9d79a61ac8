//! Buckets context for Strata.
//!
//! A `Bucket` is a named, coloured container with the soft-delete, restore
//! and destroy lifecycle. The context keeps an in-process read model in sync
//! through broker subscriptions.

pub mod application;
pub mod domain;
