use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::api::CountersSnapshot;

/// Process-wide generation counters, updated once per dispatched job.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    total_generated: AtomicU64,
    total_duration_ms: AtomicU64,
    completed_jobs: AtomicU64,
    aborted_jobs: AtomicU64,
}

impl Counters {
    pub(crate) fn record_success(&self, records: u64, elapsed: Duration) {
        self.total_generated.fetch_add(records, Ordering::Relaxed);
        self.total_duration_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.completed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aborted(&self) {
        self.aborted_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            total_generated: self.total_generated.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            aborted_jobs: self.aborted_jobs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_abort_paths_update_disjoint_fields() {
        let counters = Counters::default();
        counters.record_success(100, Duration::from_millis(250));
        counters.record_success(50, Duration::from_millis(50));
        counters.record_aborted();

        let snap = counters.snapshot();
        assert_eq!(snap.total_generated, 150);
        assert_eq!(snap.total_duration_ms, 300);
        assert_eq!(snap.completed_jobs, 2);
        assert_eq!(snap.aborted_jobs, 1);
    }
}
