use super::{
    BufferHandle,
    metrics::BufferMetrics,
    types::{Aggregate, BufferStats, Fragment, PendingSubmission, Trigger},
};
use crate::{
    config::{BufferConfig, CancelPolicy},
    constants::DEFAULT_BUFFER_NAME,
    error::{BufferError, ConfigError},
};
use futures_util::FutureExt;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

type Submission<F, A> = PendingSubmission<
    F,
    <F as Fragment<<A as Aggregate<F>>::Output>>::Share,
    <A as Aggregate<F>>::Error,
>;

/// The handle type returned when spawning a [`Buffer`] for operation `A`.
pub type HandleFor<F, A> =
    BufferHandle<F, <A as Aggregate<F>>::Output, <A as Aggregate<F>>::Error>;

/// Buffer coordinating cycles of submissions.
///
/// The buffer owns the pending submissions of the current cycle and the cycle timer. It is the
/// only task touching them: submitters go through a bounded queue and a [`BufferHandle`].
///
/// A cycle is dispatched when either:
/// - `capacity` submissions are buffered, or
/// - `interval` elapsed since the previous dispatch (or since the buffer started).
///
/// An elapsed interval with nothing buffered only restarts the timer.
pub struct Buffer<F, A>
where
    A: Aggregate<F>,
    F: Fragment<A::Output>,
{
    /// The operation run for every cycle.
    operation: A,
    /// Number of submissions that closes a cycle.
    capacity: usize,
    /// Cycle interval.
    interval: Duration,
    /// What to do with buffered submissions on cancellation.
    on_cancel: CancelPolicy,
    /// Name used in logs.
    name: String,
    /// Cancellation token of the buffer, handed to the operation.
    cancel: CancellationToken,
    /// Incoming submissions.
    receiver: mpsc::Receiver<Submission<F, A>>,
    /// Submissions of the current cycle, in arrival order.
    pending: Vec<Submission<F, A>>,
    /// Activity counters.
    stats: BufferStats,
    /// Publishes [`BufferStats`] to subscribers.
    stats_tx: watch::Sender<BufferStats>,
    /// Buffer metrics.
    metrics: BufferMetrics,
}

impl<F, A> Buffer<F, A>
where
    A: Aggregate<F>,
    F: Fragment<A::Output>,
{
    /// Creates a new [`Buffer`] and the handle used to submit to it.
    ///
    /// The buffer stops when `cancel` (or the handle's [`BufferHandle::cancel`]) is cancelled, or
    /// when every handle has been dropped.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid, see [`BufferConfig::validate`].
    pub fn new(
        cancel: &CancellationToken,
        operation: A,
        config: BufferConfig,
    ) -> (Self, HandleFor<F, A>) {
        match Self::try_new(cancel, operation, config) {
            Ok(this) => this,
            Err(err) => panic!("invalid buffer configuration: {err}"),
        }
    }

    /// Creates a new [`Buffer`], returning an error if the configuration is invalid.
    pub fn try_new(
        cancel: &CancellationToken,
        operation: A,
        config: BufferConfig,
    ) -> Result<(Self, HandleFor<F, A>), ConfigError> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.capacity);
        let (stats_tx, stats_rx) = watch::channel(BufferStats::default());
        let cancel = cancel.child_token();
        let name = config.name.unwrap_or_else(|| DEFAULT_BUFFER_NAME.to_string());

        let this = Self {
            operation,
            capacity: config.capacity,
            interval: config.interval,
            on_cancel: config.on_cancel,
            metrics: BufferMetrics::new_with_labels(&[("buffer", name.clone())]),
            name,
            cancel: cancel.clone(),
            receiver,
            pending: Vec::with_capacity(config.capacity),
            stats: BufferStats::default(),
            stats_tx,
        };

        Ok((this, BufferHandle::new(sender, cancel, stats_rx, config.capacity)))
    }

    /// Creates a new [`Buffer`] and spawns it on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid, or if called outside of a tokio runtime.
    pub fn spawn(
        cancel: &CancellationToken,
        operation: A,
        config: BufferConfig,
    ) -> HandleFor<F, A> {
        let (this, handle) = Self::new(cancel, operation, config);
        tokio::spawn(this.run());
        handle
    }

    /// Creates a new [`Buffer`] and spawns it, returning an error if the configuration is
    /// invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn try_spawn(
        cancel: &CancellationToken,
        operation: A,
        config: BufferConfig,
    ) -> Result<HandleFor<F, A>, ConfigError> {
        let (this, handle) = Self::try_new(cancel, operation, config)?;
        tokio::spawn(this.run());
        Ok(handle)
    }

    /// Runs the buffer until it is cancelled or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            buffer = %self.name,
            capacity = self.capacity,
            interval = ?self.interval,
            "Starting buffer"
        );

        let timer = tokio::time::sleep(self.interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.shutdown().await;
                    break
                }
                maybe_submission = self.receiver.recv() => {
                    let Some(submission) = maybe_submission else {
                        // all handles dropped
                        if !self.pending.is_empty() {
                            self.dispatch(Trigger::Shutdown).await;
                        }
                        break
                    };

                    self.accept(submission);
                    if self.pending.len() >= self.capacity {
                        self.dispatch(Trigger::Capacity).await;
                        timer.as_mut().reset(tokio::time::Instant::now() + self.interval);
                    }
                }
                _ = &mut timer => {
                    if !self.pending.is_empty() {
                        self.dispatch(Trigger::Interval).await;
                    }
                    timer.as_mut().reset(tokio::time::Instant::now() + self.interval);
                }
            }
        }

        self.stats.stopped = true;
        self.stats_tx.send_replace(self.stats);
        info!(buffer = %self.name, cycles = self.stats.cycles, "Buffer stopped");
    }

    /// Appends a submission to the current cycle.
    fn accept(&mut self, submission: Submission<F, A>) {
        self.pending.push(submission);
        self.stats.buffered = self.pending.len();
        self.metrics.submissions.increment(1);
        self.metrics.buffered.set(self.pending.len() as f64);
        self.stats_tx.send_replace(self.stats);
        trace!(buffer = %self.name, buffered = self.pending.len(), "Accepted submission");
    }

    /// Runs the operation over the current cycle and resolves every submission of it.
    async fn dispatch(&mut self, trigger: Trigger) {
        let cycle = std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity));
        let size = cycle.len();
        let (fragments, slots): (Vec<_>, Vec<_>) =
            cycle.into_iter().map(|submission| (submission.fragment, submission.slot)).unzip();

        debug!(buffer = %self.name, size, trigger = trigger.as_str(), "Dispatching cycle");

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.operation.aggregate(&self.cancel, &fragments))
            .catch_unwind()
            .await;
        self.metrics.record_cycle(size, started.elapsed());

        self.stats.cycles += 1;
        self.stats.dispatched += size as u64;
        self.stats.buffered = 0;
        if !matches!(outcome, Ok(Ok(_))) {
            self.stats.failed_cycles += 1;
        }
        // publish before waking the submitters
        self.stats_tx.send_replace(self.stats);

        match outcome {
            Ok(Ok(combined)) => {
                let combined = Arc::new(combined);
                for (fragment, slot) in fragments.iter().zip(slots) {
                    let share = panic::catch_unwind(AssertUnwindSafe(|| fragment.pick(&combined)))
                        .map_err(|payload| BufferError::Panicked(panic_message(payload.as_ref())));
                    let _ = slot.send(share);
                }
            }
            Ok(Err(err)) => {
                debug!(buffer = %self.name, size, "Cycle operation failed");
                self.metrics.failed_cycles.increment(1);

                let err = Arc::new(err);
                for slot in slots {
                    let _ = slot.send(Err(BufferError::Operation(err.clone())));
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                debug!(buffer = %self.name, size, %message, "Cycle operation panicked");
                self.metrics.panicked_cycles.increment(1);

                for slot in slots {
                    let _ = slot.send(Err(BufferError::Panicked(message.clone())));
                }
            }
        }
    }

    /// Stops accepting submissions and resolves everything still held by the buffer.
    ///
    /// Submissions waiting in the queue are rejected. Buffered submissions are flushed or
    /// rejected according to the [`CancelPolicy`].
    async fn shutdown(&mut self) {
        self.receiver.close();

        let mut rejected = 0u64;
        while let Some(submission) = self.receiver.recv().await {
            submission.reject(BufferError::Cancelled);
            rejected += 1;
        }

        if !self.pending.is_empty() {
            match self.on_cancel {
                CancelPolicy::Flush => self.dispatch(Trigger::Shutdown).await,
                CancelPolicy::Discard => {
                    for submission in self.pending.drain(..) {
                        submission.reject(BufferError::Cancelled);
                        rejected += 1;
                    }
                    self.stats.buffered = 0;
                }
            }
        }

        self.metrics.cancelled.increment(rejected);
        self.metrics.buffered.set(0.0);
        info!(buffer = %self.name, rejected, "Buffer cancelled");
    }
}

impl<F, A> std::fmt::Debug for Buffer<F, A>
where
    A: Aggregate<F>,
    F: Fragment<A::Output>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("interval", &self.interval)
            .field("on_cancel", &self.on_cancel)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Extracts the message of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
