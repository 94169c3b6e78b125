//! Background job queue for cache recomputation.
//!
//! ## Design
//!
//! - Jobs are typed and carry a JSON payload
//! - Retry policy with fixed, linear or exponential backoff
//! - Jobs that exhaust their attempts end dead-lettered
//! - Submission is fire-and-forget; a separate consumer claims and runs jobs
//!
//! ## Components
//!
//! - `Job`: job record with payload and lifecycle metadata
//! - `JobStore`: persistence for jobs (in-memory here)
//! - `JobQueueSubmitter`: enqueues pricelist cache updates

pub mod store;
pub mod submitter;
pub mod types;

pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use submitter::{decode_cache_update, JobQueueSubmitter};
pub use types::{BackoffStrategy, DelayOutOfRange, Job, JobAttemptRecord, JobId, JobKind, JobStatus, RetryPolicy};
