use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{Engine, EngineError, StreamEvent, StreamTarget};
use crate::pool::PoolTask;

/// Chunk-size clamp for single-schema streams.
pub(crate) const SINGLE_CHUNK_MIN: u64 = 500;
pub(crate) const SINGLE_CHUNK_MAX: u64 = 5_000;

/// Chunk-size clamp for multi-schema streams.
pub(crate) const MULTI_CHUNK_MIN: u64 = 50;
pub(crate) const MULTI_CHUNK_MAX: u64 = 1_000;

enum PumpEnd {
    Aborted,
    ReceiverGone,
    Failed(String),
}

impl Engine {
    /// Start a single-schema streaming job.
    ///
    /// The producer runs detached: it owns the registry entry and settles
    /// the counters when the stream terminates, because the HTTP handler
    /// returns before the body finishes. Dropping the receiver (client
    /// disconnect) cancels the job.
    pub fn stream_job(
        self: Arc<Self>,
        request_id: u64,
        schema: Arc<Value>,
        count: u64,
        chunk_size: u64,
        fuzz: bool,
        token: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        // Capacity 1: exactly one chunk is generated ahead of the wire,
        // which bounds memory to one chunk's worth of records.
        let (tx, rx) = mpsc::channel(1);
        let engine = self;
        tokio::spawn(async move {
            let chunk_size = chunk_size.clamp(SINGLE_CHUNK_MIN, SINGLE_CHUNK_MAX);
            let targets = vec![StreamTarget {
                collection: String::new(),
                schema,
                count,
            }];
            engine
                .run_stream(request_id, targets, chunk_size, fuzz, false, token, tx)
                .await;
        });
        rx
    }

    /// Start a multi-schema streaming job. Schemas are streamed one after
    /// another (never in parallel) with a `CollectionComplete` marker after
    /// each one.
    pub fn stream_multi_job(
        self: Arc<Self>,
        request_id: u64,
        targets: Vec<StreamTarget>,
        chunk_size: u64,
        fuzz: bool,
        token: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(1);
        let engine = self;
        tokio::spawn(async move {
            let chunk_size = chunk_size.clamp(MULTI_CHUNK_MIN, MULTI_CHUNK_MAX);
            engine
                .run_stream(request_id, targets, chunk_size, fuzz, true, token, tx)
                .await;
        });
        rx
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stream(
        &self,
        request_id: u64,
        targets: Vec<StreamTarget>,
        chunk_size: u64,
        fuzz: bool,
        per_collection_markers: bool,
        token: CancellationToken,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let started = Instant::now();
        let total: u64 = targets.iter().map(|t| t.count).sum();
        let mut completed = 0u64;
        let mut chunk_index = 0u64;

        let mut end: Result<(), PumpEnd> = Ok(());
        for target in &targets {
            end = self
                .pump_schema(
                    target,
                    chunk_size,
                    fuzz,
                    total,
                    &token,
                    &tx,
                    &mut completed,
                    &mut chunk_index,
                )
                .await;
            if end.is_err() {
                break;
            }
            if per_collection_markers {
                let marker = StreamEvent::CollectionComplete {
                    collection: target.collection.clone(),
                    records_sent: target.count,
                };
                if tx.send(marker).await.is_err() {
                    end = Err(PumpEnd::ReceiverGone);
                    break;
                }
            }
        }

        match end {
            Ok(()) => {
                let done = StreamEvent::Done {
                    total_records: completed,
                    chunks_streamed: chunk_index,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                let _ = tx.send(done).await;
                self.counters.record_success(completed, started.elapsed());
                debug!(request_id, completed, chunks = chunk_index, "stream completed");
            }
            Err(PumpEnd::Aborted) => {
                let _ = tx.send(StreamEvent::Aborted { completed }).await;
                self.counters.record_aborted();
                debug!(request_id, completed, "stream aborted");
            }
            Err(PumpEnd::ReceiverGone) => {
                // Client went away; unwind whatever is still queued.
                token.cancel();
                self.counters.record_aborted();
                debug!(request_id, completed, "stream receiver dropped");
            }
            Err(PumpEnd::Failed(message)) => {
                let _ = tx
                    .send(StreamEvent::Failed { message, completed })
                    .await;
                debug!(request_id, completed, "stream failed");
            }
        }

        self.unregister(request_id);
    }

    /// Stream one schema chunk by chunk. Exactly one pool task is in
    /// flight per chunk, awaited before the chunk is handed to the writer.
    #[allow(clippy::too_many_arguments)]
    async fn pump_schema(
        &self,
        target: &StreamTarget,
        chunk_size: u64,
        fuzz: bool,
        total: u64,
        token: &CancellationToken,
        tx: &mpsc::Sender<StreamEvent>,
        completed: &mut u64,
        chunk_index: &mut u64,
    ) -> Result<(), PumpEnd> {
        let mut sent = 0u64;
        while sent < target.count {
            if token.is_cancelled() {
                return Err(PumpEnd::Aborted);
            }

            let n = chunk_size.min(target.count - sent);
            let chunk_started = Instant::now();
            let task = PoolTask {
                schema: target.schema.clone(),
                count: n,
                fuzz,
                token: token.clone(),
            };

            match self.pool.run(task).await {
                Ok(data) => {
                    sent += n;
                    *completed += n;
                    let event = StreamEvent::Chunk {
                        index: *chunk_index,
                        data,
                        completed: *completed,
                        total,
                        duration_ms: chunk_started.elapsed().as_millis() as u64,
                    };
                    *chunk_index += 1;
                    if tx.send(event).await.is_err() {
                        return Err(PumpEnd::ReceiverGone);
                    }
                }
                Err(EngineError::Cancelled) => return Err(PumpEnd::Aborted),
                Err(err) => return Err(PumpEnd::Failed(err.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::EngineConfig;

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(
            EngineConfig {
                min_threads: 2,
                max_threads: 4,
                stop_key_ttl: EngineConfig::DEFAULT_STOP_KEY_TTL,
            },
            None,
        ))
    }

    fn schema() -> Arc<Value> {
        Arc::new(json!({
            "type": "object",
            "properties": { "x": { "type": "integer" } },
            "additionalProperties": false
        }))
    }

    #[tokio::test]
    async fn stream_emits_ceil_count_over_chunk_chunks_plus_done() {
        let engine = engine();
        let (request_id, token) = engine.register_job(None, 2_600).await;
        let mut rx = engine.clone().stream_job(request_id, schema(), 2_600, 500, false, token);

        let mut chunks = Vec::new();
        let mut done = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk {
                    index,
                    data,
                    completed,
                    total,
                    ..
                } => chunks.push((index, data.len(), completed, total)),
                StreamEvent::Done {
                    total_records,
                    chunks_streamed,
                    ..
                } => done = Some((total_records, chunks_streamed)),
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks.last().unwrap().1, 100);
        for (i, (index, _, _, total)) in chunks.iter().enumerate() {
            assert_eq!(*index, i as u64);
            assert_eq!(*total, 2_600);
        }
        assert_eq!(done, Some((2_600, 6)));
        assert_eq!(engine.counters().completed_jobs, 1);
        assert_eq!(engine.active_jobs(), 0);
    }

    #[tokio::test]
    async fn chunk_size_is_clamped_to_the_single_stream_range() {
        let engine = engine();
        let (request_id, token) = engine.register_job(None, 1_000).await;
        // Requested chunk size 10 clamps up to 500.
        let mut rx = engine.clone().stream_job(request_id, schema(), 1_000, 10, false, token);

        let mut sizes = Vec::new();
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Chunk { data, .. } = event {
                sizes.push(data.len());
            }
        }
        assert_eq!(sizes, vec![500, 500]);
    }

    #[tokio::test]
    async fn aborting_mid_stream_ends_with_an_aborted_record() {
        let engine = engine();
        let (request_id, token) = engine.register_job(Some("stream-1".into()), 1_000_000).await;
        let mut rx = engine.clone().stream_job(
            request_id,
            schema(),
            1_000_000,
            500,
            false,
            token.clone(),
        );

        let mut aborted_at = None;
        let mut received = 0u64;
        let mut stop_sent = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk { completed, .. } => {
                    received = completed;
                    if completed >= 1_000 && !stop_sent {
                        stop_sent = true;
                        assert!(engine.stop_job("stream-1").await);
                    }
                }
                StreamEvent::Aborted { completed } => {
                    aborted_at = Some(completed);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        let aborted_at = aborted_at.expect("stream must end with an aborted record");
        assert!(aborted_at < 1_000_000);
        assert!(aborted_at >= received);
        assert_eq!(engine.counters().aborted_jobs, 1);
        assert_eq!(engine.counters().completed_jobs, 0);
        assert_eq!(engine.active_jobs(), 0);
    }

    #[tokio::test]
    async fn dropping_the_receiver_cancels_the_job() {
        let engine = engine();
        let (request_id, token) = engine.register_job(None, 1_000_000).await;
        let mut rx = engine.clone().stream_job(
            request_id,
            schema(),
            1_000_000,
            500,
            false,
            token.clone(),
        );

        // Take one chunk, then walk away.
        let first = rx.recv().await;
        assert!(matches!(first, Some(StreamEvent::Chunk { .. })));
        drop(rx);

        tokio::time::timeout(std::time::Duration::from_secs(5), token.cancelled())
            .await
            .expect("producer must cancel after the receiver is gone");
        assert_eq!(engine.counters().aborted_jobs, 1);

        // Registry entry is gone too, within a bounded wait.
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while engine.active_jobs() > 0 {
            assert!(Instant::now() < deadline);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn multi_schema_streams_sequentially_with_markers() {
        let engine = engine();
        let targets = vec![
            StreamTarget {
                collection: "users".to_string(),
                schema: schema(),
                count: 120,
            },
            StreamTarget {
                collection: "orders".to_string(),
                schema: schema(),
                count: 80,
            },
        ];
        let (request_id, token) = engine.register_job(None, 200).await;
        let mut rx = engine.clone().stream_multi_job(request_id, targets, 50, false, token);

        let mut log = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk { data, .. } => log.push(format!("chunk:{}", data.len())),
                StreamEvent::CollectionComplete {
                    collection,
                    records_sent,
                } => log.push(format!("done:{collection}:{records_sent}")),
                StreamEvent::Done { total_records, .. } => {
                    log.push(format!("end:{total_records}"))
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert_eq!(
            log,
            vec![
                "chunk:50", "chunk:50", "chunk:20", "done:users:120", "chunk:50", "chunk:30",
                "done:orders:80", "end:200",
            ]
        );
    }
}
