use crate::error::BufferError;
use async_trait::async_trait;
use std::{future::Future, sync::Arc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A unit of work submitted to a [`Buffer`](super::Buffer).
///
/// A fragment is aggregated with the other fragments of its cycle into a single operation whose
/// combined output is `O`. Once the operation completes, every fragment picks its own share out
/// of the combined output.
pub trait Fragment<O>: Send + Sync + 'static {
    /// The value handed back to the submitter of this fragment.
    type Share: Send + 'static;

    /// Picks this fragment's share of the combined output.
    ///
    /// Returning `None` is not an error: the submitter receives `Ok(None)`.
    fn pick(&self, combined: &Arc<O>) -> Option<Self::Share>;
}

/// A fragment without share selection: every submitter receives the combined output.
///
/// Useful when the operation writes through the fragments, or when the combined output is what
/// every caller wants anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Whole<T>(pub T);

impl<T> Whole<T> {
    /// Wraps a value.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Returns the wrapped value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, O> Fragment<O> for Whole<T>
where
    T: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    type Share = Arc<O>;

    fn pick(&self, combined: &Arc<O>) -> Option<Self::Share> {
        Some(combined.clone())
    }
}

/// The operation run once per cycle over all fragments of the cycle.
///
/// The operation never runs concurrently with itself, and always receives between one and
/// `capacity` fragments, in the order they were accepted by the buffer.
///
/// Any `Fn(&CancellationToken, &[F]) -> impl Future<Output = Result<O, E>>` implements this
/// trait. Such a closure cannot hold on to its arguments across an `.await`; copy out what the
/// future needs before returning it.
#[async_trait]
pub trait Aggregate<F>: Send + Sync + 'static {
    /// The combined output of a cycle.
    type Output: Send + Sync + 'static;
    /// The error of a failed cycle.
    type Error: Send + Sync + 'static;

    /// Runs the operation for one cycle.
    ///
    /// The token is the buffer's cancellation token. It may already be cancelled when the final
    /// cycle is flushed on shutdown.
    async fn aggregate(
        &self,
        cancel: &CancellationToken,
        fragments: &[F],
    ) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<F, Func, Fut, O, E> Aggregate<F> for Func
where
    F: Sync,
    Func: Fn(&CancellationToken, &[F]) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send,
    O: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Output = O;
    type Error = E;

    async fn aggregate(&self, cancel: &CancellationToken, fragments: &[F]) -> Result<O, E> {
        self(cancel, fragments).await
    }
}

/// The result delivered to the submitter of a fragment.
pub type SubmitResult<S, E> = Result<Option<S>, BufferError<E>>;

/// A submission travelling from a [`BufferHandle`](super::BufferHandle) to the controller.
#[derive(Debug)]
pub(crate) struct PendingSubmission<F, S, E> {
    /// The submitted fragment.
    pub(crate) fragment: F,
    /// Result slot of the submitter.
    pub(crate) slot: oneshot::Sender<SubmitResult<S, E>>,
}

impl<F, S, E> PendingSubmission<F, S, E> {
    /// Create a new pending submission.
    pub(crate) fn new(fragment: F, slot: oneshot::Sender<SubmitResult<S, E>>) -> Self {
        Self { fragment, slot }
    }

    /// Resolves the submission with an error.
    pub(crate) fn reject(self, err: BufferError<E>) {
        // the submitter may have given up waiting
        let _ = self.slot.send(Err(err));
    }
}

/// What closed a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The buffer reached its capacity.
    Capacity,
    /// The interval elapsed.
    Interval,
    /// The buffer shut down with submissions still buffered.
    Shutdown,
}

impl Trigger {
    /// Label used in logs.
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::Interval => "interval",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Snapshot of a buffer's activity, published after every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Number of dispatched cycles.
    pub cycles: u64,
    /// Number of dispatched cycles whose operation failed or panicked.
    pub failed_cycles: u64,
    /// Number of submissions dispatched across all cycles.
    pub dispatched: u64,
    /// Number of submissions currently buffered.
    pub buffered: usize,
    /// Whether the controller has stopped.
    pub stopped: bool,
}
