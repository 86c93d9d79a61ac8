//! Accounts context for Strata.
//!
//! Users and organizations live in separate streams. Registering a user also
//! founds their first organization: the `OrganizationCreated` event is
//! published to the user's stream and linked into the organization's, so both
//! aggregates replay it.

pub mod application;
pub mod domain;
