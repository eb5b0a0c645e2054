//! Concurrent file-job pool.
//!
//! Dispatcher + worker inbox design:
//! - single-consumer upstream `mpsc::Receiver` (dispatcher)
//! - per-worker `mpsc` inbox channels
//! - blocking file I/O moved onto the blocking pool
//! - per-worker outcome accumulators, merged after shutdown
//! - explicit sender drop on shutdown before awaiting workers

use super::{execute_job, interrupted, FileJob, JobContext, Outcome};
use crate::types::LockError;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runtime stats for the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub enqueued: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub skipped: usize,
    pub per_worker_completed: Vec<usize>,
}

impl PoolStats {
    fn new(workers: usize) -> Self {
        Self {
            workers,
            enqueued: 0,
            dispatched: 0,
            completed: 0,
            skipped: 0,
            per_worker_completed: vec![0; workers],
        }
    }
}

/// Everything the workers produced, unsorted
#[derive(Debug)]
pub struct PoolOutput {
    pub outcomes: Vec<Outcome>,
    pub stats: PoolStats,
}

/// Thread-pool executor for file jobs.
pub struct ParallelExecutor {
    runtime: Runtime,
    enqueue_tx: Option<mpsc::Sender<FileJob>>,
    dispatcher_handle: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<Result<Vec<Outcome>, LockError>>>,
    signal_handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<PoolStats>>,
    cancelled: Arc<AtomicBool>,
}

impl ParallelExecutor {
    /// Create a dispatcher + worker pool with bounded channels.
    ///
    /// Ctrl-C sets the cancellation flag: jobs already running finish, jobs
    /// still queued are reported as interrupted.
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        ctx: Arc<JobContext>,
    ) -> Result<Self, LockError> {
        let workers = worker_count.max(1);
        let capacity = queue_capacity.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .enable_all()
            .build()?;

        let stats = Arc::new(Mutex::new(PoolStats::new(workers)));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = runtime.handle().clone();

        let (enqueue_tx, enqueue_rx) = mpsc::channel::<FileJob>(capacity);

        let mut worker_txs = Vec::with_capacity(workers);
        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let (worker_tx, worker_rx) = mpsc::channel::<FileJob>(capacity);
            worker_txs.push(worker_tx);
            worker_handles.push(handle.spawn(worker_loop(
                worker_id,
                worker_rx,
                Arc::clone(&ctx),
                Arc::clone(&cancelled),
                Arc::clone(&stats),
            )));
        }

        let dispatcher_handle =
            handle.spawn(dispatcher_loop(enqueue_rx, worker_txs, Arc::clone(&stats)));

        let signal_handle = {
            let cancelled = Arc::clone(&cancelled);
            handle.spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing running jobs");
                    cancelled.store(true, Ordering::SeqCst);
                }
            })
        };

        Ok(Self {
            runtime,
            enqueue_tx: Some(enqueue_tx),
            dispatcher_handle: Some(dispatcher_handle),
            worker_handles,
            signal_handle: Some(signal_handle),
            stats,
            cancelled,
        })
    }

    /// Flag checked by workers before each job
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Enqueue a job into upstream dispatcher queue.
    pub fn enqueue(&self, job: FileJob) -> Result<(), LockError> {
        let sender = self
            .enqueue_tx
            .as_ref()
            .ok_or_else(|| LockError::Pool("job queue is already closed".to_string()))?;
        let stats = Arc::clone(&self.stats);

        self.runtime.block_on(async {
            sender
                .send(job)
                .await
                .map_err(|_| LockError::Pool("job queue receiver is closed".to_string()))?;

            let mut guard = stats.lock().await;
            guard.enqueued += 1;
            Ok(())
        })
    }

    /// Close queue input, wait for dispatcher/workers and merge their outcomes.
    pub fn close_and_wait(mut self) -> Result<PoolOutput, LockError> {
        self.enqueue_tx.take();

        let dispatcher = self.dispatcher_handle.take();
        let workers = std::mem::take(&mut self.worker_handles);
        let signal = self.signal_handle.take();
        let stats = Arc::clone(&self.stats);

        self.runtime.block_on(async move {
            if let Some(handle) = dispatcher {
                handle.await.map_err(map_join_error)?;
            }

            let mut outcomes = Vec::new();
            for handle in workers {
                outcomes.extend(handle.await.map_err(map_join_error)??);
            }

            if let Some(handle) = signal {
                handle.abort();
            }

            let stats = stats.lock().await.clone();
            Ok(PoolOutput { outcomes, stats })
        })
    }
}

async fn dispatcher_loop(
    mut enqueue_rx: mpsc::Receiver<FileJob>,
    worker_txs: Vec<mpsc::Sender<FileJob>>,
    stats: Arc<Mutex<PoolStats>>,
) {
    let mut next_worker = 0usize;
    let worker_len = worker_txs.len();

    while let Some(job) = enqueue_rx.recv().await {
        if worker_len == 0 {
            break;
        }

        let target = next_worker % worker_len;
        if worker_txs[target].send(job).await.is_ok() {
            let mut guard = stats.lock().await;
            guard.dispatched += 1;
            next_worker = (next_worker + 1) % worker_len;
        }
    }
    // worker_txs are dropped here, which closes worker inboxes.
}

async fn worker_loop(
    worker_id: usize,
    mut worker_rx: mpsc::Receiver<FileJob>,
    ctx: Arc<JobContext>,
    cancelled: Arc<AtomicBool>,
    stats: Arc<Mutex<PoolStats>>,
) -> Result<Vec<Outcome>, LockError> {
    let mut outcomes = Vec::new();

    while let Some(job) = worker_rx.recv().await {
        if cancelled.load(Ordering::SeqCst) {
            outcomes.extend(interrupted(&job));
            stats.lock().await.skipped += 1;
            continue;
        }

        let job_ctx = Arc::clone(&ctx);
        let produced = tokio::task::spawn_blocking(move || {
            job_ctx.progress.set_current_file(&job.display);
            let produced = execute_job(&job_ctx, &job);
            job_ctx.progress.complete_job();
            produced
        })
        .await
        .map_err(map_join_error)?;
        outcomes.extend(produced);

        let mut guard = stats.lock().await;
        guard.completed += 1;
        if let Some(slot) = guard.per_worker_completed.get_mut(worker_id) {
            *slot += 1;
        }
    }

    Ok(outcomes)
}

fn map_join_error(error: tokio::task::JoinError) -> LockError {
    LockError::Pool(format!("worker task failed: {}", error))
}
