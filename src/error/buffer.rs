use std::sync::Arc;

/// Errors returned to a caller of [`BufferHandle::submit`](crate::buffer::BufferHandle::submit).
///
/// `E` is the error type of the aggregation operation. It is shared behind an [`Arc`] since a
/// failed cycle hands the same error to every submission it contained.
#[derive(Debug, thiserror::Error)]
pub enum BufferError<E> {
    /// The buffer was cancelled before the submission could be dispatched.
    #[error("buffer cancelled")]
    Cancelled,
    /// The aggregation operation returned an error for the cycle.
    #[error("aggregation failed: {0}")]
    Operation(Arc<E>),
    /// The aggregation operation panicked while running the cycle.
    #[error("aggregation panicked: {0}")]
    Panicked(String),
}

impl<E> BufferError<E> {
    /// Returns `true` if the submission failed because the buffer was cancelled.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the cycle containing the submission failed, either through an error or
    /// a panic of the aggregation operation.
    pub const fn is_aggregation(&self) -> bool {
        matches!(self, Self::Operation(_) | Self::Panicked(_))
    }

    /// Returns the operation error, if any.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> Clone for BufferError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            Self::Operation(err) => Self::Operation(err.clone()),
            Self::Panicked(msg) => Self::Panicked(msg.clone()),
        }
    }
}
