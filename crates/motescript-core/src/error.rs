//! Error types for the core crate.

use thiserror::Error;

use crate::time::SimTime;

/// Errors from typed variable access on a node's memory image.
///
/// None of these are fatal to a test run. [`VarAccessor::write`] turns them
/// into a `false` return plus an error log so the calling plan can continue.
///
/// [`VarAccessor::write`]: crate::memory::VarAccessor::write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Symbol does not exist in the node's memory layout.
    #[error("could not find variable '{name}'")]
    VariableNotFound {
        /// Symbol that failed to resolve.
        name: String,
    },

    /// Declared storage size does not match the access width.
    #[error("variable '{name}' is {actual} bytes wide, access needs {expected}")]
    WidthMismatch {
        /// Symbol being accessed.
        name: String,
        /// Width of the requested access in bytes.
        expected: usize,
        /// Declared size of the symbol in bytes.
        actual: usize,
    },

    /// Access falls outside the memory image.
    #[error("access of {len} bytes at 0x{address:x} is out of bounds")]
    OutOfBounds {
        /// Start address of the access.
        address: u64,
        /// Length of the access in bytes.
        len: usize,
    },
}

/// Errors from driving a [`TestController`](crate::controller::TestController).
///
/// These indicate a driver that feeds events out of order. Protocol failures
/// observed in the message stream are a [`Verdict`](crate::controller::Verdict),
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// A message or timeout arrived before `Start`.
    #[error("controller received {event} before start")]
    NotStarted {
        /// Kind of event that arrived early.
        event: &'static str,
    },

    /// `Start` was delivered twice.
    #[error("controller already started")]
    AlreadyStarted,
}

/// Errors from parsing a simulator log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line lacks the `time:id:text` separators.
    #[error("malformed log line (expected time:id:text): {line}")]
    Malformed {
        /// Offending line.
        line: String,
    },

    /// Time field is not an unsigned integer.
    #[error("invalid timestamp '{field}'")]
    InvalidTime {
        /// Offending field.
        field: String,
    },

    /// Node id field is not an unsigned integer.
    #[error("invalid node id '{field}'")]
    InvalidNodeId {
        /// Offending field.
        field: String,
    },
}

/// Errors from running a plan against a simulator.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Controller rejected an event.
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),

    /// A simulator service failed.
    #[error("simulator error: {0}")]
    Simulator(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Nothing left to deliver but no verdict was reached.
    #[error("simulation stalled at {at} without a verdict")]
    Stalled {
        /// Simulated time when the queue ran dry.
        at: SimTime,
    },

    /// The driver's delivery limit was reached.
    #[error("event limit of {limit} reached at {at}")]
    EventLimitReached {
        /// Configured limit.
        limit: usize,
        /// Simulated time when the limit was hit.
        at: SimTime,
    },
}

impl DriverError {
    /// Wrap a simulator service error.
    pub fn simulator<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Simulator(Box::new(err))
    }
}
