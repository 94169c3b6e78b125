//! Infrastructure layer: job queue, catalog storage, config, schema.

pub mod catalog;
pub mod config;
pub mod hook;
pub mod jobs;
pub mod schema;


pub use catalog::{CatalogError, InMemoryCatalog};
pub use config::{ConfigError, JobQueueConfig, Settings};
pub use hook::{HookError, PricelistItemWriteHook};
pub use jobs::{InMemoryJobStore, JobQueueSubmitter, JobStore};
