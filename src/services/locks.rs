use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-job lock table. Mutations of one job are serialized while unrelated
/// jobs proceed in parallel. Entries are created on first use and removed
/// once no task holds or waits on them.
#[derive(Clone, Default)]
pub struct JobLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, job_id: Uuid) -> JobLockGuard {
        // Clone the Arc out before awaiting so the shard lock is released.
        let mutex = self.locks.entry(job_id).or_default().clone();
        let guard = mutex.lock_owned().await;

        JobLockGuard {
            job_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of jobs with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

pub struct JobLockGuard {
    job_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table itself still references the mutex: nobody waits on it.
        self.locks
            .remove_if(&self.job_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
