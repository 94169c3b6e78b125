//! Job storage implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use super::types::{Job, JobId, JobKind, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Enqueue a new job.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending (or retry-scheduled) job that is ready to run.
    /// Returns None if no jobs are available.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Jobs of a kind, in enqueue order.
    fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl<T> From<PoisonError<T>> for JobStoreError {
    fn from(_: PoisonError<T>) -> Self {
        JobStoreError::Storage("job store lock poisoned".to_string())
    }
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Default)]
struct Queue {
    /// Jobs keyed by enqueue sequence, so iteration is FIFO.
    jobs: BTreeMap<u64, Job>,
    seq_of: HashMap<JobId, u64>,
    next_seq: u64,
}

/// In-memory job store for tests/dev.
///
/// Finished jobs stay in the queue until [`InMemoryJobStore::purge_terminal`]
/// is called; the store has no retention of its own.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    queue: RwLock<Queue>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drop completed and dead-lettered jobs. Returns how many were removed.
    pub fn purge_terminal(&self) -> Result<usize, JobStoreError> {
        let mut queue = self.queue.write()?;
        let finished: Vec<(u64, JobId)> = queue
            .jobs
            .iter()
            .filter(|(_, job)| {
                matches!(job.status, JobStatus::Completed | JobStatus::DeadLettered { .. })
            })
            .map(|(seq, job)| (*seq, job.id))
            .collect();

        for (seq, id) in &finished {
            queue.jobs.remove(seq);
            queue.seq_of.remove(id);
        }
        Ok(finished.len())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut queue = self.queue.write()?;
        if queue.seq_of.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.seq_of.insert(id, seq);
        queue.jobs.insert(seq, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let queue = self.queue.read()?;
        Ok(queue
            .seq_of
            .get(&job_id)
            .and_then(|seq| queue.jobs.get(seq))
            .cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut queue = self.queue.write()?;
        let seq = *queue
            .seq_of
            .get(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        queue.jobs.insert(seq, job.clone());
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut queue = self.queue.write()?;
        let next = queue.jobs.values_mut().find(|j| {
            matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready()
        });

        Ok(next.map(|job| {
            job.mark_running();
            job.clone()
        }))
    }

    fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let queue = self.queue.read()?;
        Ok(queue
            .jobs
            .values()
            .filter(|j| &j.kind == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let queue = self.queue.read()?;
        let mut stats = JobStats::default();

        for job in queue.jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }

        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_kind(kind, limit)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
