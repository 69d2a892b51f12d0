//! In-process adapters for the store, queue and blob contracts. Each can be
//! told to fail to exercise error paths.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use classify_jobs::models::job::{ClassificationJob, JobStatus};
use classify_jobs::services::locks::JobLocks;
use classify_jobs::services::queue::{MessageQueue, QueueError, ReceivedMessage};
use classify_jobs::services::storage::{BlobLocation, BlobStore, StorageError};
use classify_jobs::services::store::{JobStore, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, ClassificationJob>>,
    fail_writes: AtomicBool,
    write_budget: Mutex<Option<usize>>,
    writes: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Allow only `budget` more writes, then fail every write until reset
    /// with `None`.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        *self.write_budget.lock().unwrap_or_else(|e| e.into_inner()) = budget;
    }

    /// Number of successful `create`/`put` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        let mut budget = self.write_budget.lock().unwrap_or_else(|e| e.into_inner());
        match budget.as_mut() {
            Some(0) => Err(StoreError::Unavailable("write budget spent".to_string())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &ClassificationJob) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        jobs.insert(job.id, job.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ClassificationJob>, StoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn put(&self, job: &ClassificationJob) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound(job.id)),
        }
    }

    async fn list(
        &self,
        limit: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<ClassificationJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<ClassificationJob> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Queue with explicit in-flight tracking. Nothing times out on its own;
/// [`MemoryQueue::expire_in_flight`] simulates the visibility timeout.
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    in_flight: Mutex<HashMap<String, (String, String)>>,
    deleted: AtomicUsize,
    fail_sends: AtomicBool,
    batch_size: usize,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(10)
    }
}

impl MemoryQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            deleted: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            batch_size: batch_size.max(1),
        }
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Enqueue directly, bypassing failure injection.
    pub fn push(&self, queue: &str, body: impl Into<String>) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(queue.to_string())
            .or_default()
            .push_back(body.into());
    }

    /// Remove and return every waiting message body.
    pub fn drain(&self, queue: &str) -> Vec<String> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn waiting(&self, queue: &str) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn deleted(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Make every unacknowledged message receivable again.
    pub fn expire_in_flight(&self) -> usize {
        let expired: Vec<(String, String)> = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = expired.len();
        for (queue, body) in expired {
            self.push(&queue, body);
        }
        count
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn send(&self, queue: &str, body: String) -> Result<(), QueueError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable(format!("{queue} rejected send")));
        }
        self.push(queue, body);
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Vec<ReceivedMessage>, QueueError> {
        let batch: Vec<String> = {
            let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
            match queues.get_mut(queue) {
                Some(q) => {
                    let n = q.len().min(self.batch_size);
                    q.drain(..n).collect()
                }
                None => Vec::new(),
            }
        };

        if batch.is_empty() {
            // Stand-in for the long poll so idle consumers do not spin.
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Ok(Vec::new());
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        Ok(batch
            .into_iter()
            .map(|body| {
                let handle = Uuid::new_v4().to_string();
                in_flight.insert(handle.clone(), (queue.to_string(), body.clone()));
                ReceivedMessage { handle, body }
            })
            .collect())
    }

    async fn delete(&self, _queue: &str, handle: &str) -> Result<(), QueueError> {
        let removed = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(handle);
        if removed.is_some() {
            self.deleted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    copies: Mutex<Vec<(BlobLocation, BlobLocation)>>,
    fail_copies: AtomicBool,
    observed_locks: Mutex<Option<JobLocks>>,
    locks_held_at_copy: Mutex<Vec<usize>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_copies(&self, fail: bool) {
        self.fail_copies.store(fail, Ordering::SeqCst);
    }

    pub fn copies(&self) -> Vec<(BlobLocation, BlobLocation)> {
        self.copies.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sample `locks.active()` on every copy attempt.
    pub fn observe_locks(&self, locks: JobLocks) {
        *self.observed_locks.lock().unwrap_or_else(|e| e.into_inner()) = Some(locks);
    }

    pub fn locks_held_at_copy(&self) -> Vec<usize> {
        self.locks_held_at_copy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn copy(&self, src: &BlobLocation, dst: &BlobLocation) -> Result<(), StorageError> {
        let held = self
            .observed_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(JobLocks::active);
        if let Some(held) = held {
            self.locks_held_at_copy
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(held);
        }
        if self.fail_copies.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("cannot copy {src}")));
        }
        self.copies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((src.clone(), dst.clone()));
        Ok(())
    }
}
