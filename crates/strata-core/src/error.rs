//! Engine error types.

use thiserror::Error;

/// Top-level error type shared by the engine and its collaborators.
///
/// The engine never translates these: repository and broker errors reach the
/// caller exactly as they were raised.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A read that expected a result found none.
    #[error("not found: {0}")]
    NotFound(String),

    /// A reducer or policy precondition failed. Aborts the current command.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The stream advanced between load and append.
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream: String,
        /// The version the writer loaded.
        expected: u64,
        /// The version found at append time.
        actual: u64,
    },

    /// A broker subscriber failed while handling a published event.
    #[error("handler error: {0}")]
    Handler(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl EventStoreError {
    /// Returns `true` for [`EventStoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for [`EventStoreError::InvariantViolation`].
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }

    /// Returns `true` for [`EventStoreError::ConcurrencyConflict`].
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Returns early with [`EventStoreError::InvariantViolation`] when the
/// condition does not hold.
///
/// ```
/// use strata_core::ensure;
/// use strata_core::error::EventStoreError;
///
/// fn rename(name: &str) -> Result<(), EventStoreError> {
///     ensure!(!name.trim().is_empty(), "name must not be empty");
///     Ok(())
/// }
///
/// assert!(rename(" ").unwrap_err().is_invariant_violation());
/// ```
#[macro_export]
macro_rules! ensure {
    ($condition:expr, $($message:tt)+) => {
        if !$condition {
            return ::core::result::Result::Err(
                $crate::error::EventStoreError::InvariantViolation(format!($($message)+)),
            );
        }
    };
}
