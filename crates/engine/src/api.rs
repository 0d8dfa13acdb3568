//! Public API types for the `dataforge` generation engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dataforge_schema::Preparer;

use crate::counters::Counters;
use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::stop_store::StopStore;

/// Configuration for the engine singleton.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lower bound of the executor pool (threads kept warm).
    pub min_threads: usize,

    /// Upper bound of the executor pool; also the concurrency cap for
    /// generation tasks.
    pub max_threads: usize,

    /// TTL attached to distributed stop marks.
    pub stop_key_ttl: Duration,
}

impl EngineConfig {
    /// How long an idle executor thread survives before the runtime
    /// reclaims it. Also used to build the runtime's blocking pool.
    pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default TTL for distributed stop marks.
    pub const DEFAULT_STOP_KEY_TTL: Duration = Duration::from_secs(60 * 60);

    /// Default pool bounds: `(CPU count, 2 × CPU count)`.
    pub fn default_threads() -> (usize, usize) {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cpus, cpus * 2)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let (min_threads, max_threads) = Self::default_threads();
        Self {
            min_threads,
            max_threads,
            stop_key_ttl: Self::DEFAULT_STOP_KEY_TTL,
        }
    }
}

/// Errors surfaced by generation jobs.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The job's cancellation token fired.
    #[error("job cancelled")]
    Cancelled,

    /// Generation failed inside a worker task.
    #[error("generation failed: {0}")]
    Generation(String),
}

/// Snapshot of the process-wide generation counters.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountersSnapshot {
    /// Records generated by completed jobs.
    pub total_generated: u64,
    /// Wall time spent by completed jobs, in milliseconds.
    pub total_duration_ms: u64,
    /// Jobs that ran to completion.
    pub completed_jobs: u64,
    /// Jobs that were aborted.
    pub aborted_jobs: u64,
}

/// Observable worker-pool state.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Tasks currently executing.
    pub active: usize,
    /// Tasks waiting for an executor.
    pub queued: usize,
    /// Tasks completed over the process lifetime.
    pub completed: u64,
    /// Configured lower pool bound.
    pub min_threads: usize,
    /// Configured upper pool bound.
    pub max_threads: usize,
}

/// One row of the active-job listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Internal request id.
    pub request_id: u64,
    /// External job id, when the client supplied one.
    #[serde(rename = "externalJobId", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Requested record count.
    pub count: u64,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    /// Milliseconds since the job started.
    #[serde(rename = "elapsed")]
    pub elapsed_ms: u64,
}

/// One schema of a multi-schema stream.
#[derive(Debug, Clone)]
pub struct StreamTarget {
    /// Collection label carried through `collectionComplete` records.
    pub collection: String,
    /// Prepared schema.
    pub schema: Arc<Value>,
    /// Records to stream for this schema.
    pub count: u64,
}

/// Events produced by a streaming job, in emission order.
#[derive(Debug)]
pub enum StreamEvent {
    /// One generated chunk.
    Chunk {
        /// Zero-based chunk index.
        index: u64,
        /// The chunk's records.
        data: Vec<Value>,
        /// Records delivered so far, this chunk included.
        completed: u64,
        /// Total records the stream will deliver.
        total: u64,
        /// Time spent generating this chunk, in milliseconds.
        duration_ms: u64,
    },
    /// A multi-schema stream finished one collection.
    CollectionComplete {
        /// Collection label.
        collection: String,
        /// Records delivered for this collection.
        records_sent: u64,
    },
    /// The stream delivered everything.
    Done {
        /// Records delivered in total.
        total_records: u64,
        /// Data chunks emitted.
        chunks_streamed: u64,
        /// Stream wall time, in milliseconds.
        duration_ms: u64,
    },
    /// The job was cancelled mid-stream.
    Aborted {
        /// Records delivered before the abort.
        completed: u64,
    },
    /// A chunk failed to generate.
    Failed {
        /// Failure description.
        message: String,
        /// Records delivered before the failure.
        completed: u64,
    },
}

/// The process-wide job execution engine.
///
/// Owns the worker pool, the job registry, the generation counters, the
/// schema preparer and the optional abort-signal store. Constructed once at
/// process start, injected into the HTTP layer, shut down explicitly.
pub struct Engine {
    pub(crate) cfg: EngineConfig,
    pub(crate) pool: WorkerPool,
    pub(crate) registry: JobRegistry,
    pub(crate) counters: Counters,
    pub(crate) preparer: Preparer,
    pub(crate) stop_store: Option<StopStore>,
    shutting_down: AtomicBool,
}

impl Engine {
    /// Build an engine from its configuration and an optional stop store.
    pub fn new(cfg: EngineConfig, stop_store: Option<StopStore>) -> Self {
        let pool = WorkerPool::new(cfg.min_threads, cfg.max_threads);
        Self {
            cfg,
            pool,
            registry: JobRegistry::default(),
            counters: Counters::default(),
            preparer: Preparer::new(),
            stop_store,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// The schema preparer and its caches.
    pub fn preparer(&self) -> &Preparer {
        &self.preparer
    }

    /// Register a job and hand back its id and cancellation token.
    ///
    /// When the abort store already carries a stop mark for the external
    /// id, the token comes back pre-cancelled: a replica re-processing a
    /// stopped job id never does real work.
    pub async fn register_job(
        &self,
        external_id: Option<String>,
        count: u64,
    ) -> (u64, CancellationToken) {
        let (request_id, token) = self.registry.register(external_id.clone(), count);
        if let (Some(store), Some(external)) = (&self.stop_store, &external_id) {
            if store.is_stopped(external).await {
                tracing::info!(request_id, job_id = %external, "job pre-cancelled by stop mark");
                token.cancel();
            }
        }
        (request_id, token)
    }

    /// Drop a job's registry entry. Idempotent.
    pub fn unregister(&self, request_id: u64) {
        self.registry.unregister(request_id);
    }

    /// Cancel one job by internal request id.
    pub fn cancel_request(&self, request_id: u64) -> bool {
        self.registry.cancel_by_request_id(request_id)
    }

    /// Cancel one job by external id and publish the stop mark.
    ///
    /// The mark is written even when no local job matches, so that other
    /// replicas handling the same id observe the stop.
    pub async fn stop_job(&self, external_id: &str) -> bool {
        let stopped = self.registry.cancel_by_external_id(external_id);
        if let Some(store) = &self.stop_store {
            store.set_stop(external_id, self.cfg.stop_key_ttl).await;
        }
        stopped
    }

    /// Cancel every active job.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Active jobs, oldest first.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.registry.list()
    }

    /// Number of active jobs.
    pub fn active_jobs(&self) -> usize {
        self.registry.active_count()
    }

    /// Observable worker-pool state.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Snapshot of the generation counters.
    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Whether shutdown has begun (readiness probes key off this).
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst) || self.pool.is_closed()
    }

    /// Begin shutdown: cancel every job and refuse new pool tasks.
    /// Returns how many jobs were cancelled.
    pub fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let cancelled = self.registry.cancel_all();
        self.pool.close();
        cancelled
    }

    /// Wait for in-flight pool tasks to unwind, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.pool.drain(timeout).await
    }
}
