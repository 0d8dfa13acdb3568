use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{Engine, EngineError};
use crate::pool::{self, PoolTask};

/// Jobs below this count run inline on the caller's task; the pool's
/// scheduling overhead is not worth paying for them.
const INLINE_MAX: u64 = 300;

/// Over-subscription factor: roughly five tasks per live executor keeps the
/// FIFO queue non-empty while executors drain chunks at their own pace.
const OVERSUBSCRIPTION: u64 = 5;

/// Worker count never exceeds `⌈count / 25⌉`, so tiny fan-outs still hand
/// each task a meaningful chunk.
const MIN_RECORDS_PER_WORKER: u64 = 25;

impl Engine {
    /// Run one buffered generation job and settle the counters exactly
    /// once: success, aborted, or (on failure) neither.
    pub async fn generate(
        &self,
        schema: Arc<Value>,
        count: u64,
        fuzz: bool,
        token: &CancellationToken,
    ) -> Result<Vec<Value>, EngineError> {
        let started = Instant::now();
        let result = self.dispatch(schema, count, fuzz, token).await;
        match &result {
            Ok(records) => {
                self.counters
                    .record_success(records.len() as u64, started.elapsed());
            }
            Err(EngineError::Cancelled) => self.counters.record_aborted(),
            Err(_) => {}
        }
        result
    }

    async fn dispatch(
        &self,
        schema: Arc<Value>,
        count: u64,
        fuzz: bool,
        token: &CancellationToken,
    ) -> Result<Vec<Value>, EngineError> {
        if count < INLINE_MAX {
            let task = PoolTask {
                schema,
                count,
                fuzz,
                token: token.clone(),
            };
            return pool::generate_chunk(&task);
        }
        self.fan_out(schema, count, fuzz, token).await
    }

    /// Split a large job into chunks and fan them out over the pool.
    /// Chunk outputs are concatenated in submission order regardless of
    /// executor completion order.
    async fn fan_out(
        &self,
        schema: Arc<Value>,
        count: u64,
        fuzz: bool,
        token: &CancellationToken,
    ) -> Result<Vec<Value>, EngineError> {
        let executors = self.pool.executors() as u64;
        let workers = (executors * OVERSUBSCRIPTION)
            .min(count.div_ceil(MIN_RECORDS_PER_WORKER))
            .max(1);
        let chunk = count.div_ceil(workers);

        let mut handles = Vec::with_capacity(workers as usize);
        let mut offset = 0;
        while offset < count {
            let n = chunk.min(count - offset);
            let task = PoolTask {
                schema: schema.clone(),
                count: n,
                fuzz,
                token: token.clone(),
            };
            let pool = self.pool.clone();
            handles.push(tokio::spawn(async move { pool.run(task).await }));
            offset += n;
        }

        debug!(count, workers = handles.len(), chunk, "fanned out generation job");

        let mut records = Vec::new();
        let mut failure: Option<EngineError> = None;
        for handle in handles {
            let chunk_result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(EngineError::Generation(format!(
                    "worker task join failed: {err}"
                ))),
            };
            match chunk_result {
                Ok(chunk_records) => {
                    if failure.is_none() {
                        records.extend(chunk_records);
                    }
                }
                Err(err) => {
                    if failure.is_none() {
                        // Siblings share the job token; stop them, the job
                        // result is already settled.
                        token.cancel();
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(records),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::EngineConfig;

    fn engine() -> Engine {
        Engine::new(
            EngineConfig {
                min_threads: 2,
                max_threads: 4,
                stop_key_ttl: EngineConfig::DEFAULT_STOP_KEY_TTL,
            },
            None,
        )
    }

    fn counter_schema() -> Arc<Value> {
        Arc::new(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "format": "uuid" },
                "n": { "type": "integer", "minimum": 1, "maximum": 10 }
            },
            "additionalProperties": false
        }))
    }

    #[tokio::test]
    async fn small_jobs_run_inline_without_touching_the_pool() {
        let engine = engine();
        let token = CancellationToken::new();
        let records = engine
            .generate(counter_schema(), 3, false, &token)
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(engine.pool_stats().completed, 0);
        assert_eq!(engine.counters().completed_jobs, 1);
        assert_eq!(engine.counters().total_generated, 3);
    }

    #[tokio::test]
    async fn large_jobs_fan_out_and_preserve_the_requested_count() {
        let engine = engine();
        let token = CancellationToken::new();
        let records = engine
            .generate(counter_schema(), 10_000, false, &token)
            .await
            .unwrap();

        assert_eq!(records.len(), 10_000);
        assert!(engine.pool_stats().completed > 1);
        for record in &records {
            let n = record["n"].as_i64().unwrap();
            assert!((1..=10).contains(&n));
        }
    }

    #[tokio::test]
    async fn cancelled_jobs_report_aborted_exactly_once() {
        let engine = Arc::new(engine());
        let token = CancellationToken::new();

        let run = {
            let engine = engine.clone();
            let schema = counter_schema();
            let token = token.clone();
            tokio::spawn(async move { engine.generate(schema, 2_000_000, false, &token).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();

        let result = run.await.unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));

        let counters = engine.counters();
        assert_eq!(counters.aborted_jobs, 1);
        assert_eq!(counters.completed_jobs, 0);
        assert_eq!(counters.total_generated, 0);
    }

    #[tokio::test]
    async fn pre_cancelled_inline_jobs_abort_before_generating() {
        let engine = engine();
        let token = CancellationToken::new();
        token.cancel();

        let result = engine.generate(counter_schema(), 5, false, &token).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(engine.counters().aborted_jobs, 1);
    }

    #[test]
    fn fan_out_arithmetic_matches_the_policy() {
        // 4 executors, count 10_000: 20 workers of 500 records each.
        let executors: u64 = 4;
        let count: u64 = 10_000;
        let workers = (executors * OVERSUBSCRIPTION)
            .min(count.div_ceil(MIN_RECORDS_PER_WORKER))
            .max(1);
        assert_eq!(workers, 20);
        assert_eq!(count.div_ceil(workers), 500);

        // Tiny counts are capped by the per-worker floor.
        let count: u64 = 320;
        let workers = (executors * OVERSUBSCRIPTION)
            .min(count.div_ceil(MIN_RECORDS_PER_WORKER))
            .max(1);
        assert_eq!(workers, 13);
    }
}
