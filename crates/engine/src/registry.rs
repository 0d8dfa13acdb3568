use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::JobInfo;

struct JobEntry {
    external_id: Option<String>,
    count: u64,
    started_at: DateTime<Utc>,
    started: Instant,
    token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    next_request_id: u64,
    jobs: HashMap<u64, JobEntry>,
    external: HashMap<String, u64>,
}

/// Tracks every in-flight job and owns its cancellation token.
///
/// Entries live here exclusively; handlers hold only a request id and a
/// token clone. The lock is held for map operations only, never across I/O.
#[derive(Default)]
pub(crate) struct JobRegistry {
    inner: Mutex<Inner>,
}

impl JobRegistry {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(
        &self,
        external_id: Option<String>,
        count: u64,
    ) -> (u64, CancellationToken) {
        let mut inner = self.lock();
        inner.next_request_id += 1;
        let request_id = inner.next_request_id;

        let token = CancellationToken::new();
        if let Some(external) = &external_id {
            // Last registration wins for a reused external id.
            inner.external.insert(external.clone(), request_id);
        }
        inner.jobs.insert(
            request_id,
            JobEntry {
                external_id: external_id.clone(),
                count,
                started_at: Utc::now(),
                started: Instant::now(),
                token: token.clone(),
            },
        );

        info!(request_id, job_id = external_id.as_deref(), count, "job registered");
        (request_id, token)
    }

    pub(crate) fn unregister(&self, request_id: u64) {
        let mut inner = self.lock();
        if let Some(entry) = inner.jobs.remove(&request_id) {
            if let Some(external) = entry.external_id {
                if inner.external.get(&external) == Some(&request_id) {
                    inner.external.remove(&external);
                }
            }
            debug!(request_id, "job unregistered");
        }
    }

    /// Cancel one job by internal id: signal its token and drop the entry.
    pub(crate) fn cancel_by_request_id(&self, request_id: u64) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.jobs.remove(&request_id) else {
            return false;
        };
        entry.token.cancel();
        if let Some(external) = entry.external_id {
            if inner.external.get(&external) == Some(&request_id) {
                inner.external.remove(&external);
            }
        }
        info!(request_id, "job cancelled");
        true
    }

    pub(crate) fn cancel_by_external_id(&self, external_id: &str) -> bool {
        let request_id = {
            let inner = self.lock();
            match inner.external.get(external_id) {
                Some(id) => *id,
                None => return false,
            }
        };
        self.cancel_by_request_id(request_id)
    }

    /// Cancel everything. The request-id counter restarts only when this
    /// empties the registry; partial cancels never touch it.
    pub(crate) fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        let cancelled = inner.jobs.len();
        for entry in inner.jobs.values() {
            entry.token.cancel();
        }
        inner.jobs.clear();
        inner.external.clear();
        if inner.jobs.is_empty() {
            inner.next_request_id = 0;
        }
        if cancelled > 0 {
            info!(cancelled, "cancelled all active jobs");
        }
        cancelled
    }

    pub(crate) fn list(&self) -> Vec<JobInfo> {
        let inner = self.lock();
        let mut jobs: Vec<JobInfo> = inner
            .jobs
            .iter()
            .map(|(request_id, entry)| JobInfo {
                request_id: *request_id,
                external_id: entry.external_id.clone(),
                count: entry.count,
                started_at: entry.started_at.to_rfc3339(),
                elapsed_ms: entry.started.elapsed().as_millis() as u64,
            })
            .collect();
        jobs.sort_by_key(|job| job.request_id);
        jobs
    }

    pub(crate) fn active_count(&self) -> usize {
        self.lock().jobs.len()
    }
}
