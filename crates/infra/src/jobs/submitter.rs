//! Job-queue adapter for the cache update port.

use tracing::debug;

use pricecache_pricelist::{BoxError, CacheUpdateJob, CacheUpdateSubmitter};

use super::store::JobStore;
use super::types::{Job, JobKind};
use crate::config::JobQueueConfig;

/// Enqueues each cache update as a `PricelistCacheUpdate` job.
///
/// The submitter returns as soon as the job is stored; whoever claims it
/// runs the actual recomputation.
pub struct JobQueueSubmitter<S> {
    store: S,
    config: JobQueueConfig,
}

impl<S: JobStore> JobQueueSubmitter<S> {
    pub fn new(store: S, config: JobQueueConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: JobStore> CacheUpdateSubmitter for JobQueueSubmitter<S> {
    fn submit(&self, update: CacheUpdateJob) -> Result<(), BoxError> {
        let payload = serde_json::to_value(&update)?;
        let job = Job::new(JobKind::PricelistCacheUpdate, payload)
            .with_retry_policy(self.config.retry.clone())
            .delayed(self.config.delay)?;
        let job_id = self.store.enqueue(job)?;
        debug!(
            %job_id,
            method = CacheUpdateJob::METHOD,
            products = update.product_ids.len(),
            "cache update job enqueued"
        );
        Ok(())
    }
}

/// Read back the cache update carried by a queued job.
pub fn decode_cache_update(job: &Job) -> Result<CacheUpdateJob, serde_json::Error> {
    serde_json::from_value(job.payload.clone())
}
