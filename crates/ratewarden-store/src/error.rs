//! Store errors (spec.md §7: transient store failures are fail-open on
//! browse paths and dropped on update paths — this crate only reports
//! them, callers decide the fallback).

/// Error produced by a [`crate::CounterBackend`] operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend connection or command failed.
    #[error("store operation failed: {0}")]
    Backend(String),
    /// The operation exceeded its configured timeout.
    #[error("store operation timed out after {0}ms")]
    Timeout(u64),
}
