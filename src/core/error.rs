//! Error types for pool operations.
//!
//! Every failure maps onto a small numeric code table ([`ErrorCode`]) so that
//! callers bridging to FFI or logs can keep a stable, flat representation.

use std::fmt;

use thiserror::Error;

/// Flat status codes shared by every pool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// The operation completed.
    Success = 0,
    /// Bad argument, or the pool is not in a usable state.
    Invalid = -1,
    /// The pool lock could not be taken or released.
    LockFailure = -2,
    /// The task queue has no free slot.
    QueueFull = -3,
    /// The pool is shutting down or already shut down.
    Shutdown = -4,
    /// A worker thread failed to start or did not exit cleanly.
    RunFailure = -5,
    /// The slot arena could not be allocated.
    OutOfMemory = -6,
    /// The inline task payload is larger than the pool accepts.
    TaskArgOverflow = -7,
}

const MESSAGES: [&str; 8] = [
    "success",
    "invalid argument or pool state",
    "lock failure",
    "task queue is full",
    "pool is shutting down",
    "worker thread run failure",
    "out of memory",
    "task argument too large",
];

impl ErrorCode {
    /// Every code, ordered by magnitude.
    pub const ALL: [Self; 8] = [
        Self::Success,
        Self::Invalid,
        Self::LockFailure,
        Self::QueueFull,
        Self::Shutdown,
        Self::RunFailure,
        Self::OutOfMemory,
        Self::TaskArgOverflow,
    ];

    /// Numeric value of the code (zero or negative).
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Human-readable message for the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        MESSAGES[self.as_i32().unsigned_abs() as usize]
    }

    /// Looks a code up by its numeric value.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_i32() == value)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors produced by the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A construction parameter is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid for the pool's current state.
    #[error("invalid pool state: {0}")]
    Invalid(String),

    /// Every slot in the task queue is occupied.
    #[error("task queue is full")]
    QueueFull,

    /// The pool no longer accepts tasks.
    #[error("pool is shutting down")]
    ShuttingDown,

    /// Shutdown was requested twice.
    #[error("pool is already shutting down")]
    AlreadyShuttingDown,

    /// A worker thread could not be spawned.
    #[error("failed to start worker {id}: {source}")]
    WorkerStart {
        /// 1-based id of the worker that failed.
        id: usize,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread terminated abnormally and could not be joined cleanly.
    #[error("worker {id} panicked")]
    WorkerPanicked {
        /// 1-based id of the worker.
        id: usize,
    },

    /// The slot arena could not be reserved.
    #[error("out of memory reserving {bytes} bytes")]
    OutOfMemory {
        /// Size of the failed reservation.
        bytes: usize,
    },

    /// The inline payload exceeds the configured maximum.
    #[error("task argument of {len} bytes exceeds the {max} byte limit")]
    TaskArgOverflow {
        /// Declared payload length.
        len: usize,
        /// Configured per-task maximum.
        max: usize,
    },
}

impl PoolError {
    /// Code-table entry for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) | Self::Invalid(_) => ErrorCode::Invalid,
            Self::QueueFull => ErrorCode::QueueFull,
            Self::ShuttingDown | Self::AlreadyShuttingDown => ErrorCode::Shutdown,
            Self::WorkerStart { .. } | Self::WorkerPanicked { .. } => ErrorCode::RunFailure,
            Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            Self::TaskArgOverflow { .. } => ErrorCode::TaskArgOverflow,
        }
    }

    /// Whether the caller may simply retry later (capacity errors).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull)
    }
}

/// A submission the pool refused.
///
/// Like a failed channel send, the caller gets its argument back so
/// ownership is never silently lost.
pub struct Rejected<A> {
    error: PoolError,
    argument: Option<A>,
}

impl<A> Rejected<A> {
    pub(crate) const fn new(error: PoolError, argument: Option<A>) -> Self {
        Self { error, argument }
    }

    /// The reason for the rejection.
    #[must_use]
    pub const fn error(&self) -> &PoolError {
        &self.error
    }

    /// Recovers the argument that was not enqueued.
    #[must_use]
    pub fn into_argument(self) -> Option<A> {
        self.argument
    }

    /// Splits the rejection into its error and argument.
    #[must_use]
    pub fn into_parts(self) -> (PoolError, Option<A>) {
        (self.error, self.argument)
    }
}

impl<A> fmt::Debug for Rejected<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("has_argument", &self.argument.is_some())
            .finish()
    }
}

impl<A> fmt::Display for Rejected<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task rejected: {}", self.error)
    }
}

impl<A> std::error::Error for Rejected<A> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<A> From<Rejected<A>> for PoolError {
    fn from(rejected: Rejected<A>) -> Self {
        rejected.error
    }
}
