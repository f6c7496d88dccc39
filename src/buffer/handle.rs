use super::types::{BufferStats, Fragment, PendingSubmission, SubmitResult};
use crate::error::BufferError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Handle for submitting fragments to a [`Buffer`](super::Buffer).
///
/// Handles are cheap to clone and can be shared by any number of concurrent submitters. The
/// buffer stops once it is cancelled or every handle is dropped.
pub struct BufferHandle<F, O, E>
where
    F: Fragment<O>,
{
    sender: mpsc::Sender<PendingSubmission<F, F::Share, E>>,
    cancel: CancellationToken,
    stats: watch::Receiver<BufferStats>,
    capacity: usize,
}

impl<F, O, E> BufferHandle<F, O, E>
where
    F: Fragment<O>,
{
    /// Create a new buffer handle
    pub(crate) fn new(
        sender: mpsc::Sender<PendingSubmission<F, F::Share, E>>,
        cancel: CancellationToken,
        stats: watch::Receiver<BufferStats>,
        capacity: usize,
    ) -> Self {
        Self { sender, cancel, stats, capacity }
    }

    /// Submits a fragment and waits for its share of the cycle it ends up in.
    ///
    /// Returns [`BufferError::Cancelled`] without enqueueing anything if the buffer is already
    /// cancelled, and fails fast with the same error if the buffer is cancelled while waiting for
    /// room in the queue.
    pub async fn submit(&self, fragment: F) -> SubmitResult<F::Share, E> {
        if self.cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let (tx, rx) = oneshot::channel();
        let submission = PendingSubmission::new(fragment, tx);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BufferError::Cancelled),
            sent = self.sender.send(submission) => {
                if sent.is_err() {
                    return Err(BufferError::Cancelled);
                }
            }
        }

        // a dropped slot means the buffer task is gone
        rx.await.unwrap_or(Err(BufferError::Cancelled))
    }

    /// Blocking variant of [`BufferHandle::submit`] for callers outside of the async runtime.
    ///
    /// Blocks the current thread, so it must not be called from within an asynchronous execution
    /// context.
    pub fn submit_blocking(&self, fragment: F) -> SubmitResult<F::Share, E> {
        futures::executor::block_on(self.submit(fragment))
    }

    /// Cancels the buffer.
    ///
    /// Cancelling an already cancelled buffer has no effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` if the buffer is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the cancellation token of the buffer.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the number of submissions that closes a cycle.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the latest [`BufferStats`].
    pub fn stats(&self) -> BufferStats {
        *self.stats.borrow()
    }

    /// Subscribe to [`BufferStats`] updates.
    pub fn subscribe(&self) -> watch::Receiver<BufferStats> {
        self.stats.clone()
    }

    /// Waits until the buffer stops accepting submissions.
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

impl<F, O, E> Clone for BufferHandle<F, O, E>
where
    F: Fragment<O>,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancel: self.cancel.clone(),
            stats: self.stats.clone(),
            capacity: self.capacity,
        }
    }
}

impl<F, O, E> std::fmt::Debug for BufferHandle<F, O, E>
where
    F: Fragment<O>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferHandle")
            .field("capacity", &self.capacity)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("stats", &*self.stats.borrow())
            .finish_non_exhaustive()
    }
}
