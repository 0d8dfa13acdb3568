use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::{debug, warn};

/// Optional distributed stop-mark store.
///
/// A process that handles a stop request writes `<prefix>stop:<jobId>` with
/// a TTL in addition to cancelling locally, so a replica that later sees the
/// same external job id starts pre-cancelled. Local cancellation stays
/// authoritative: running jobs never poll this store. Every operation is
/// best-effort; failures are logged and reported as "not stopped".
pub struct StopStore {
    conn: ConnectionManager,
    prefix: String,
}

impl StopStore {
    /// Connect to the store and hold a reconnecting connection for the
    /// process lifetime.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn key(&self, job_id: &str) -> String {
        format!("{}stop:{}", self.prefix, job_id)
    }

    /// Write the stop mark for an external job id.
    pub async fn set_stop(&self, job_id: &str, ttl: Duration) {
        let key = self.key(job_id);
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => debug!(key, "stop mark set"),
            Err(err) => warn!(key, %err, "failed to set stop mark"),
        }
    }

    /// Whether a stop mark exists for this external job id. Returns false
    /// when the store is unreachable.
    pub async fn is_stopped(&self, job_id: &str) -> bool {
        let key = self.key(job_id);
        let mut conn = self.conn.clone();
        match redis::cmd("GET")
            .arg(&key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(mark) => mark.is_some(),
            Err(err) => {
                warn!(key, %err, "stop mark lookup failed, treating as not stopped");
                false
            }
        }
    }
}
