//! Bounded-concurrency job scheduler: `Submit`/`Results`/`Wait`/`Stop` over N
//! spawned workers consuming a bounded FIFO.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("queue full: {0}")]
    QueueFull(String),
    #[error("cancelled")]
    Cancelled,
}

/// A unit of work: given a cancellation token scoped to this job, produce an
/// outcome. `E` is whatever error type the caller's jobs fail with (the
/// tag copier uses `crate::error::ReplicationError`).
pub type Job<E> = Pin<Box<dyn Future<Output = std::result::Result<(), E>> + Send>>;

pub struct JobOutcome<E> {
    pub id: String,
    pub error: Option<E>,
}

struct Envelope<E> {
    id: String,
    work: Job<E>,
    cancel: CancellationToken,
}

/// A bounded-concurrency pool of N workers draining a bounded FIFO queue.
/// Submission is non-blocking: `submit` returns `QueueFull` immediately if
/// the queue has no slack, rather than blocking the caller.
pub struct WorkerPool<E: Send + 'static> {
    tx: mpsc::Sender<Envelope<E>>,
    results: Arc<tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<JobOutcome<E>>>>>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
    submitted: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl<E: Send + 'static> WorkerPool<E> {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Envelope<E>>(queue_capacity);
        let (result_tx, result_rx) = mpsc::unbounded_channel::<JobOutcome<E>>();
        let cancel = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let submitted = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = rx.clone();
            let result_tx = result_tx.clone();
            let pool_cancel = cancel.clone();
            let in_flight = in_flight.clone();
            let completed = completed.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let envelope = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(envelope) = envelope else {
                        break;
                    };

                    in_flight.fetch_add(1, Ordering::SeqCst);
                    let outcome = if pool_cancel.is_cancelled() || envelope.cancel.is_cancelled() {
                        JobOutcome {
                            id: envelope.id,
                            error: None,
                        }
                    } else {
                        tokio::select! {
                            result = envelope.work => JobOutcome {
                                id: envelope.id,
                                error: result.err(),
                            },
                            _ = pool_cancel.cancelled() => JobOutcome {
                                id: envelope.id,
                                error: None,
                            },
                        }
                    };
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    let _ = result_tx.send(outcome);
                }
            }));
        }

        Self {
            tx,
            results: Arc::new(tokio::sync::Mutex::new(Some(result_rx))),
            cancel,
            handles,
            in_flight,
            submitted,
            completed,
        }
    }

    /// Non-blocking submit. Returns `QueueFull` immediately if the bounded
    /// channel has no slack; the caller decides whether to drop, requeue
    /// externally, or retry later (never a silent drop by contract).
    pub fn submit(&self, id: impl Into<String>, work: Job<E>) -> std::result::Result<(), WorkerError> {
        let id = id.into();
        let envelope = Envelope {
            id: id.clone(),
            work,
            cancel: self.cancel.child_token(),
        };
        self.tx
            .try_send(envelope)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => WorkerError::QueueFull(id),
                mpsc::error::TrySendError::Closed(_) => WorkerError::Cancelled,
            })?;
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Takes ownership of the result stream. Can only be called once; a
    /// second call returns `None`.
    pub fn take_results(&self) -> Option<UnboundedReceiverStream<JobOutcome<E>>> {
        let mut guard = self.results.try_lock().ok()?;
        guard.take().map(UnboundedReceiverStream::new)
    }

    /// Cooperatively cancels all outstanding and future work.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Waits until every worker task has exited (the queue sender must be
    /// dropped, or `stop()` called, for workers to observe channel closure).
    pub async fn wait(self) {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplicationError;
    use futures_util::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn fairness_100_jobs_10_workers() {
        let pool: WorkerPool<ReplicationError> = WorkerPool::new(10, 200);
        let mut stream = pool.take_results().unwrap();

        for i in 0..100 {
            let work: Job<ReplicationError> = Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            });
            pool.submit(format!("job-{i}"), work).unwrap();
        }

        let start = std::time::Instant::now();
        let mut received = 0;
        while received < 100 {
            if stream.next().await.is_some() {
                received += 1;
            }
        }
        assert!(start.elapsed() < Duration::from_millis(600));
        pool.wait().await;
    }

    #[tokio::test]
    async fn queue_full_returns_error_not_blocking() {
        let pool: WorkerPool<ReplicationError> = WorkerPool::new(1, 1);
        let blocker: Job<ReplicationError> = Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        pool.submit("blocker", blocker).unwrap();

        let filler: Job<ReplicationError> = Box::pin(async { Ok(()) });
        pool.submit("filler", filler).unwrap();

        let overflow: Job<ReplicationError> = Box::pin(async { Ok(()) });
        let err = pool.submit("overflow", overflow);
        assert!(matches!(err, Err(WorkerError::QueueFull(_))));
    }

    #[tokio::test]
    async fn every_submitted_job_produces_one_result() {
        let pool: WorkerPool<ReplicationError> = WorkerPool::new(4, 20);
        let mut stream = pool.take_results().unwrap();
        for i in 0..10 {
            let work: Job<ReplicationError> = Box::pin(async move {
                if i % 3 == 0 {
                    Err(ReplicationError::NotFound("x".into()))
                } else {
                    Ok(())
                }
            });
            pool.submit(format!("job-{i}"), work).unwrap();
        }
        let mut count = 0;
        while count < 10 {
            if stream.next().await.is_some() {
                count += 1;
            }
        }
        assert_eq!(count, 10);
    }
}
