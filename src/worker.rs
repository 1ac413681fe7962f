//! Generic single-thread serial job executor.
//!
//! Backs the Coordinator's session worker: a queue of boxed closures drained
//! one at a time by a single dedicated task, so Session and Buffer mutation
//! never race. The Transmitter's transmit worker has its own bespoke async
//! actor instead (it must interleave HTTP awaits with pause/backoff timers,
//! a shape a boxed-closure queue can't express).

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs boxed closures one at a time, in submission order, on a single
/// spawned Tokio task.
pub struct SerialWorker {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    _handle: JoinHandle<()>,
}

impl SerialWorker {
    /// Spawn a new worker. `name` is used only for diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker_name = name.clone();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            tracing::debug!(worker = %worker_name, "serial worker shut down");
        });
        Self {
            name,
            tx,
            _handle: handle,
        }
    }

    /// Enqueue a closure to run on this worker. Returns an error if the
    /// worker has already shut down (its receiving task ended).
    pub fn submit<F>(&self, job: F) -> Result<(), String>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| format!("serial worker `{}` is no longer running", self.name))
    }

    /// Worker name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let worker = SerialWorker::new("test");
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..10 {
            let order = order.clone();
            worker.submit(move || order.lock().unwrap().push(i)).unwrap();
        }
        // Drain: submit a final job and wait on a channel to know all prior
        // jobs ran (the worker is strictly FIFO).
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        worker.submit(move || { let _ = done_tx.send(()); }).unwrap();
        done_rx.await.unwrap();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn jobs_run_exactly_once() {
        let worker = SerialWorker::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            worker
                .submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        worker.submit(move || { let _ = done_tx.send(()); }).unwrap();
        done_rx.await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
