//! Timed buffer error types

use thiserror::Error;

/// Errors returned by [`crate::TimedBuffer::append`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The append would grow the accumulation past its maximum size
    #[error("max buffer size of {max} exceeded: {current} buffered, {requested} requested")]
    CapacityExceeded {
        max: usize,
        current: usize,
        requested: usize,
    },

    /// The buffer has been closed
    #[error("buffer is closed")]
    Closed,
}
