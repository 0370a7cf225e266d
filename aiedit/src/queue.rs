//! Per-resource batch serialization.
//!
//! Every resource a session touches gets exactly one [`EditQueue`]: a
//! spawned worker task draining a bounded MPSC channel of apply jobs. The
//! worker runs at most one job at a time and in enqueue order, which is the
//! entire ordering story for a single file — queues for different resources
//! are independent tasks and run concurrently.
//!
//! A failing job reports only to its own completion channel; the worker
//! loop keeps draining. Once the shared cancellation flag is set, every
//! remaining job is completed with `Cancelled` without being run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use aiedit_core::error::EngineError;

/// A unit of work: applies one batch to one resource.
pub type ApplyJob = BoxFuture<'static, Result<(), EngineError>>;

struct QueuedJob {
    job: ApplyJob,
    done: oneshot::Sender<Result<(), EngineError>>,
}

/// FIFO serializer for one resource's batches.
///
/// Cloning shares the same worker. Dropping every clone closes the channel;
/// the worker drains jobs already queued and then exits.
#[derive(Clone, Debug)]
pub struct EditQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl EditQueue {
    /// Spawns the worker task for `resource`.
    ///
    /// `capacity` bounds the number of waiting jobs — [`enqueue`](Self::enqueue)
    /// awaits for a slot when the queue is full. `cancelled` is checked
    /// before each job runs; once set, queued jobs complete immediately with
    /// [`EngineError::Cancelled`].
    pub fn spawn(resource: String, capacity: usize, cancelled: Arc<AtomicBool>) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueuedJob>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(QueuedJob { job, done }) = rx.recv().await {
                if cancelled.load(Ordering::Relaxed) {
                    let _ = done.send(Err(EngineError::Cancelled));
                    continue;
                }
                let result = job.await;
                if let Err(e) = &result {
                    tracing::debug!(resource = %resource, error = %e, "apply job failed");
                }
                // Receiver may have been dropped; the result is then discarded.
                let _ = done.send(result);
            }
            tracing::trace!(resource = %resource, "edit queue drained");
        });
        Self { tx }
    }

    /// Enqueues `job` and awaits its completion.
    ///
    /// Completion order equals enqueue order for this queue. The returned
    /// error is the job's own failure — a failure never leaks into later
    /// jobs on the same queue or any job on another queue.
    ///
    /// # Errors
    ///
    /// The job's error, [`EngineError::Cancelled`] when the session was
    /// cancelled before the job ran, or [`EngineError::SessionClosed`] when
    /// the worker has already shut down.
    pub async fn enqueue(&self, job: ApplyJob) -> Result<(), EngineError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(QueuedJob { job, done: done_tx })
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        done_rx.await.map_err(|_| EngineError::SessionClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[tokio::test]
    async fn jobs_run_in_enqueue_order() {
        let queue = EditQueue::spawn("f".into(), 8, no_cancel());
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        // All five jobs are in flight at once; earlier jobs sleep longer, so
        // any out-of-order execution would reorder the log.
        let pending: Vec<_> = (0..5u32)
            .map(|i| {
                let log = Arc::clone(&log);
                queue.enqueue(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5 - i as u64)).await;
                    log.lock().unwrap().push(i);
                    Ok(())
                }))
            })
            .collect();
        for result in futures::future::join_all(pending).await {
            result.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failure_does_not_stall_the_queue() {
        let queue = EditQueue::spawn("f".into(), 4, no_cancel());
        let err = queue
            .enqueue(Box::pin(async {
                Err(EngineError::QueueApplyFailure { resource: "f".into(), reason: "boom".into() })
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QueueApplyFailure { .. }));

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        queue
            .enqueue(Box::pin(async move {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_drains_without_running() {
        let cancelled = no_cancel();
        let queue = EditQueue::spawn("f".into(), 4, Arc::clone(&cancelled));
        cancelled.store(true, Ordering::Relaxed);
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        let err = queue
            .enqueue(Box::pin(async move {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
