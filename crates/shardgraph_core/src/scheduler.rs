//! Command scheduling.
//!
//! Commands are serialized by the domain model's write gate; a scheduler only
//! decides which thread runs them. Two schedulers are provided:
//! - [`InlineScheduler`] runs every job on the calling thread
//! - [`WorkerScheduler`] runs jobs in FIFO order on one dedicated thread

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A unit of work handed to a scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs submitted by the domain model.
pub trait Scheduler: Send + Sync {
    /// Queues `job` for execution.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` if the scheduler no longer accepts work.
    fn schedule(&self, job: Job) -> CoreResult<()>;
}

/// Runs each job immediately on the caller's thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn schedule(&self, job: Job) -> CoreResult<()> {
        job();
        Ok(())
    }
}

/// Runs jobs one at a time on a dedicated thread.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = Arc::new(WorkerScheduler::new("editor-worker")?);
/// let domain = DomainModel::builder(model).scheduler(scheduler).build();
/// let ticket = domain.submit(|snapshot| { /* ... */ Ok(()) })?;
/// ticket.await?;
/// ```
pub struct WorkerScheduler {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerScheduler {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Ok(job) = receiver.recv() {
                job();
            }
            debug!(worker = %name, "worker stopped");
        })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    ///
    /// Called from the worker itself, it only closes the queue.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("worker thread panicked");
        }
    }
}

impl Scheduler for WorkerScheduler {
    fn schedule(&self, job: Job) -> CoreResult<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(CoreError::QueueClosed)?;
        sender.send(job).map_err(|_| CoreError::QueueClosed)
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared flag a caller sets to ask a running command to stop.
///
/// Commands observe it through
/// [`Snapshot::check_cancelled`](crate::Snapshot::check_cancelled).
/// Cancelling after the command finished has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once the token was triggered.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Completion handle of a submitted command.
///
/// Resolves once the command committed, was discarded or failed. Await it
/// from async code or call [`wait`](Self::wait) from a plain thread.
pub struct CommandTicket<T> {
    receiver: oneshot::Receiver<CoreResult<T>>,
    cancel: CancellationToken,
}

impl<T> CommandTicket<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<CoreResult<T>>, cancel: CancellationToken) -> Self {
        Self { receiver, cancel }
    }

    /// Asks the command to stop at its next cancellation check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token the command observes.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Blocks until the command finishes.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns the command's error, or `QueueClosed` if the scheduler
    /// dropped the job.
    pub fn wait(self) -> CoreResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(CoreError::QueueClosed))
    }
}

impl<T> Unpin for CommandTicket<T> {}

impl<T> Future for CommandTicket<T> {
    type Output = CoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CoreError::QueueClosed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn inline_runs_immediately() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&flag);
        InlineScheduler
            .schedule(Box::new(move || seen.store(true, Ordering::SeqCst)))
            .unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn worker_runs_in_fifo_order_on_named_thread() {
        let scheduler = WorkerScheduler::new("fifo-worker").unwrap();
        let (tx, rx) = channel();
        for i in 0..10 {
            let tx = tx.clone();
            scheduler
                .schedule(Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send((i, name)).unwrap();
                }))
                .unwrap();
        }
        drop(tx);
        let seen: Vec<_> = rx.iter().collect();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
        assert!(seen
            .iter()
            .all(|(_, name)| name.as_deref() == Some("fifo-worker")));
    }

    #[test]
    fn closed_worker_rejects_jobs() {
        let scheduler = WorkerScheduler::new("closing-worker").unwrap();
        scheduler.shutdown();
        assert!(matches!(
            scheduler.schedule(Box::new(|| {})),
            Err(CoreError::QueueClosed)
        ));
    }

    #[test]
    fn dropped_sender_reports_queue_closed() {
        let (tx, rx) = oneshot::channel::<CoreResult<()>>();
        drop(tx);
        let ticket = CommandTicket::new(rx, CancellationToken::new());
        assert!(matches!(ticket.wait(), Err(CoreError::QueueClosed)));
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
