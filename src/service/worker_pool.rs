//! Bounded worker pool with credit-based admission.
//!
//! A [`WorkerPool`] owns a fixed set of worker threads. Each worker
//! constructs its [`Algorithm`](crate::algorithm::Algorithm) exactly once
//! (algorithms are expensive to build) and then loops on a shared work
//! channel. Admission is controlled by a credit counter in `[0, pool_size]`:
//! dispatch takes a credit, completion gives it back, so the number of
//! in-flight jobs never exceeds the pool size and the bounded work channel
//! never blocks the dispatcher.
//!
//! ```text
//! submit_for_processing ──► pending FIFO ──► dispatch_pending ──► work channel
//!                                               │ credit -1          │
//!                                               ▼                    ▼
//!                          completion channel ◄─────────────── worker threads
//!                          (owning service restores the credit and re-drains)
//! ```
//!
//! Coordination is pure message passing: no state is shared with the workers
//! beyond the two channels.

use crate::algorithm::{run_algorithm, AlgorithmFactory};
use crate::config::Device;
use crate::resource::Resource;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A finished job, emitted by a worker through the completion channel.
#[derive(Debug)]
pub struct JobCompletion {
    /// The resource as originally submitted.
    pub resource: Resource,
    /// The algorithm's result, or an error-resource on failure.
    pub result: Resource,
    /// Time the processing step took (zero for failures).
    pub elapsed: Duration,
    /// Opaque caller data passed through unchanged.
    pub extra: Option<Value>,
}

struct WorkItem {
    resource: Resource,
    extra: Option<Value>,
}

/// A fixed-size pool of algorithm workers.
pub struct WorkerPool {
    pool_size: usize,
    pending: Mutex<VecDeque<WorkItem>>,
    free_credits: AtomicUsize,
    peak_in_flight: AtomicUsize,
    /// Taken on terminate; dropping it closes the work channel.
    work_tx: Mutex<Option<mpsc::Sender<WorkItem>>>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates the pool and spawns its workers.
    ///
    /// Returns the pool plus the completion channel the owning service must
    /// drain. Each worker constructs one algorithm via the factory before
    /// accepting work.
    pub fn new(
        pool_size: usize,
        device: Device,
        factory: Arc<dyn AlgorithmFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<JobCompletion>) {
        assert!(pool_size > 0, "pool size must be > 0");

        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(pool_size);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let work_rx = Arc::new(Mutex::new(work_rx));

        let mut workers = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            let factory = Arc::clone(&factory);
            let work_rx = Arc::clone(&work_rx);
            let completion_tx = completion_tx.clone();

            let handle = std::thread::Builder::new()
                .name(format!("pool-worker-{index}"))
                .spawn(move || worker_loop(index, device, factory, work_rx, completion_tx))
                .expect("failed to spawn pool worker thread");
            workers.push(handle);
        }

        info!(pool_size, device = %device, "Worker pool started");

        let pool = Self {
            pool_size,
            pending: Mutex::new(VecDeque::new()),
            free_credits: AtomicUsize::new(pool_size),
            peak_in_flight: AtomicUsize::new(0),
            work_tx: Mutex::new(Some(work_tx)),
            workers: Mutex::new(workers),
        };
        (pool, completion_rx)
    }

    /// Returns the configured number of workers.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of currently available admission credits.
    pub fn free_credits(&self) -> usize {
        self.free_credits.load(Ordering::SeqCst)
    }

    /// Returns the number of jobs currently dispatched to workers.
    pub fn in_flight(&self) -> usize {
        self.pool_size - self.free_credits()
    }

    /// Returns the peak number of concurrently dispatched jobs observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the number of jobs waiting in the pending queue.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    /// Appends a job to the pending queue. Never blocks the caller.
    pub fn submit_for_processing(&self, resource: Resource, extra: Option<Value>) {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.push_back(WorkItem { resource, extra });
        debug!(queue_depth = pending.len(), "Job queued in worker pool");
    }

    /// Drains the pending queue into the workers while credits remain.
    ///
    /// Each dispatched job consumes one credit; credits bound the work
    /// channel occupancy, so the send below can never hit a full channel.
    pub fn dispatch_pending(&self) {
        loop {
            if !self.try_take_credit() {
                return;
            }

            let item = {
                let mut pending = self.pending.lock().expect("pending lock poisoned");
                pending.pop_front()
            };

            let Some(item) = item else {
                self.release_credit();
                return;
            };

            self.update_peak();

            let work_tx = self.work_tx.lock().expect("work channel lock poisoned");
            match work_tx.as_ref().map(|tx| tx.try_send(item)) {
                Some(Ok(())) => {
                    debug!(
                        free_credits = self.free_credits(),
                        "Job dispatched to worker"
                    );
                }
                Some(Err(_)) | None => {
                    // Pool terminated between the credit grab and the send.
                    self.release_credit();
                    return;
                }
            }
        }
    }

    /// Restores one admission credit after a completed job.
    ///
    /// The owning service must call this before re-draining the queue.
    pub fn release_credit(&self) {
        let previous = self.free_credits.fetch_add(1, Ordering::SeqCst);
        debug_assert!(previous < self.pool_size, "credit released twice");
    }

    /// Atomically takes a credit if one is available.
    fn try_take_credit(&self) -> bool {
        self.free_credits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |credits| {
                credits.checked_sub(1)
            })
            .is_ok()
    }

    fn update_peak(&self) {
        let current = self.in_flight();
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    /// Shuts the pool down: discards pending work, closes the work channel
    /// and joins every worker. Idempotent.
    pub fn terminate(&self) {
        let closed = {
            let mut work_tx = self.work_tx.lock().expect("work channel lock poisoned");
            work_tx.take().is_some()
        };
        if !closed {
            return;
        }

        let dropped = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            let dropped = pending.len();
            pending.clear();
            dropped
        };
        if dropped > 0 {
            warn!(dropped, "Discarded pending jobs on pool termination");
        }

        let handles = {
            let mut workers = self.workers.lock().expect("workers lock poisoned");
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            let _ = handle.join();
        }

        info!(pool_size = self.pool_size, "Worker pool terminated");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pool_size", &self.pool_size)
            .field("free_credits", &self.free_credits())
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// Body of one worker thread.
///
/// Constructs the algorithm once, then processes items until the work
/// channel closes. All failures leave as error-resources through the
/// completion channel; the loop itself cannot fail.
fn worker_loop(
    index: usize,
    device: Device,
    factory: Arc<dyn AlgorithmFactory>,
    work_rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    completion_tx: mpsc::UnboundedSender<JobCompletion>,
) {
    let algorithm = factory.create(device);
    debug!(worker = index, algorithm = algorithm.name(), "Worker ready");

    loop {
        let item = {
            let mut rx = work_rx.lock().expect("work receiver lock poisoned");
            rx.blocking_recv()
        };
        let Some(item) = item else {
            break;
        };

        let outcome = run_algorithm(algorithm.as_ref(), &item.resource);

        let completion = JobCompletion {
            resource: item.resource,
            result: outcome.resource,
            elapsed: outcome.elapsed,
            extra: item.extra,
        };
        if completion_tx.send(completion).is_err() {
            // Owning service is gone; nothing left to notify.
            break;
        }
    }

    debug!(worker = index, "Worker exiting");
}
