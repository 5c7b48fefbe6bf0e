//! Error types for entity creation, family registration, and the job queue.
//!
//! This module declares focused, composable error types used across the
//! runtime. Each error carries enough context to make failures actionable
//! while remaining small and cheap to pass around or convert into the
//! aggregate [`ECSError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   index space exhaustion, family cap exceeded, worker pool build
//!   failure).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`ECSError`].
//! * **Actionability:** Structured fields (requested vs. available
//!   capacity) make logs useful without reproducing the issue.
//!
//! Note that most entity-system *operations* do not return errors at all:
//! acting on a stale or invalid id is a silent no-op by contract. Errors
//! surface only from the fallible constructors: creating entities and
//! components, registering families, building worker pools.

use std::fmt;

/// Convenient alias for results produced by the runtime.
pub type ECSResult<T> = Result<T, ECSError>;

/// Returned when an index space has no room for another allocation.
///
/// This arises when the entity table or a component pool would need to
/// grow past the width of the index field in its packed id.
///
/// ### Fields
/// * `needed` — Total number of slots the operation attempted to reach.
/// * `capacity` — The upper bound that prevented the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// Total slots the operation attempted to allocate.
    pub needed: u64,

    /// Current capacity limiting the operation.
    pub capacity: u64,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index space exhausted ({} needed; capacity {})",
            self.needed, self.capacity
        )
    }
}

impl std::error::Error for CapacityError {}

/// Errors produced by the component family registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyError {
    /// The registry ran out of family identifiers.
    CapacityExceeded {
        /// Maximum number of families supported.
        cap: usize,
    },

    /// The registry lock was poisoned by a panicking writer.
    PoisonedLock,
}

impl fmt::Display for FamilyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FamilyError::CapacityExceeded { cap } => {
                write!(f, "component family cap of {} exceeded", cap)
            }
            FamilyError::PoisonedLock => {
                f.write_str("component family registry lock poisoned")
            }
        }
    }
}

impl std::error::Error for FamilyError {}

/// Returned when the job queue's worker pool could not be built.
///
/// Wraps the underlying thread pool build failure as a message, since the
/// source error type is not `Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQueueError {
    /// Human-readable description of the build failure.
    pub reason: String,
}

impl fmt::Display for JobQueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to build job queue worker pool: {}", self.reason)
    }
}

impl std::error::Error for JobQueueError {}

/// Aggregate error for runtime operations.
///
/// `From<T>` conversions are implemented for the low-level errors so
/// fallible constructors can use `?` and still return a single type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ECSError {
    /// An index space (entities or a component pool) is exhausted.
    Capacity(CapacityError),

    /// The family registry failed.
    Family(FamilyError),

    /// The job queue worker pool could not be built.
    JobQueue(JobQueueError),

    /// An internal lock was poisoned by a panicking holder.
    PoisonedLock,
}

impl fmt::Display for ECSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ECSError::Capacity(e) => write!(f, "{e}"),
            ECSError::Family(e) => write!(f, "{e}"),
            ECSError::JobQueue(e) => write!(f, "{e}"),
            ECSError::PoisonedLock => f.write_str("internal lock poisoned"),
        }
    }
}

impl std::error::Error for ECSError {}

impl From<CapacityError> for ECSError {
    fn from(e: CapacityError) -> Self {
        ECSError::Capacity(e)
    }
}

impl From<FamilyError> for ECSError {
    fn from(e: FamilyError) -> Self {
        ECSError::Family(e)
    }
}

impl From<JobQueueError> for ECSError {
    fn from(e: JobQueueError) -> Self {
        ECSError::JobQueue(e)
    }
}
