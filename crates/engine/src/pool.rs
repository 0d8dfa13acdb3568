use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::api::{EngineError, PoolStats};

// Preallocation ceiling for chunk buffers; the vector grows past it as
// records arrive, so caller-supplied counts never size an allocation.
const CHUNK_PREALLOC_MAX: u64 = 4096;

/// One unit of generation work. Tasks are stateless beyond their arguments
/// and share their job's cancellation token.
pub(crate) struct PoolTask {
    pub(crate) schema: Arc<Value>,
    pub(crate) count: u64,
    pub(crate) fuzz: bool,
    pub(crate) token: CancellationToken,
}

/// Semaphore-bounded executor pool over the blocking thread pool.
///
/// At most `max_threads` tasks run concurrently; excess callers queue FIFO
/// on the semaphore. The blocking threads themselves are created on demand
/// and reclaimed by the runtime after the configured idle timeout, so the
/// live thread count floats between `min_threads` and `max_threads`.
#[derive(Clone)]
pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    min_threads: usize,
    max_threads: usize,
}

impl WorkerPool {
    pub(crate) fn new(min_threads: usize, max_threads: usize) -> Self {
        let min_threads = min_threads.max(1);
        let max_threads = max_threads.max(min_threads);
        Self {
            semaphore: Arc::new(Semaphore::new(max_threads)),
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicU64::new(0)),
            min_threads,
            max_threads,
        }
    }

    /// Run one generation task to completion.
    ///
    /// A token signalled before the task starts skips execution entirely;
    /// one signalled mid-run is observed at the next record boundary. The
    /// future must be polled to completion (callers spawn it), so the
    /// active/queued gauges always pair up.
    pub(crate) async fn run(&self, task: PoolTask) -> Result<Vec<Value>, EngineError> {
        if task.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        let permit = self.semaphore.clone().acquire_owned().await;
        self.queued.fetch_sub(1, Ordering::SeqCst);
        let _permit =
            permit.map_err(|_| EngineError::Generation("worker pool is shut down".to_string()))?;

        // The wait in the queue may have outlived the job.
        if task.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let joined = tokio::task::spawn_blocking(move || generate_chunk(&task)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        match joined {
            Ok(Ok(records)) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Ok(records)
            }
            Ok(Err(err)) => Err(err),
            Err(err) => Err(EngineError::Generation(format!("worker task failed: {err}"))),
        }
    }

    /// Live executor estimate used by the dispatcher's fan-out arithmetic.
    pub(crate) fn executors(&self) -> usize {
        self.active
            .load(Ordering::SeqCst)
            .clamp(self.min_threads, self.max_threads)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.active.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::Relaxed),
            min_threads: self.min_threads,
            max_threads: self.max_threads,
        }
    }

    /// Refuse new tasks. Queued callers get a generation error; running
    /// tasks finish (or unwind via their cancelled tokens).
    pub(crate) fn close(&self) {
        self.semaphore.close();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Wait until no task is active or queued, up to `timeout`.
    pub(crate) async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.stats();
            if stats.active == 0 && stats.queued == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Generate `task.count` records sequentially, checking the cancellation
/// token between records. The per-record call itself is never interrupted.
pub(crate) fn generate_chunk(task: &PoolTask) -> Result<Vec<Value>, EngineError> {
    let mut records = Vec::with_capacity(task.count.min(CHUNK_PREALLOC_MAX) as usize);
    for _ in 0..task.count {
        if task.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        records.push(dataforge_schema::one(&task.schema, task.fuzz));
    }
    Ok(records)
}
