//! Post-write trigger for pricelist items.
//!
//! Runs cache invalidation for items that were just created or edited and
//! writes the resulting skipped flags back to the catalog.

use std::sync::Arc;

use tracing::info;

use pricecache_core::{DomainError, PricelistItemId};
use pricecache_pricelist::{InvalidationError, InvalidationReport, PricelistCacheInvalidator};

use crate::catalog::{CatalogError, InMemoryCatalog};
use crate::config::{ConfigError, Settings};
use crate::jobs::{JobQueueSubmitter, JobStore};

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Invalidation(#[from] InvalidationError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

type CatalogInvalidator<S> =
    PricelistCacheInvalidator<Arc<InMemoryCatalog>, Arc<InMemoryCatalog>, JobQueueSubmitter<S>>;

pub struct PricelistItemWriteHook<S> {
    catalog: Arc<InMemoryCatalog>,
    invalidator: CatalogInvalidator<S>,
}

impl<S: JobStore> PricelistItemWriteHook<S> {
    pub fn new(catalog: Arc<InMemoryCatalog>, jobs: S, settings: &Settings) -> Result<Self, HookError> {
        settings.jobs.validate()?;
        let submitter = JobQueueSubmitter::new(jobs, settings.jobs.clone());
        let invalidator = PricelistCacheInvalidator::new(
            catalog.clone(),
            catalog.clone(),
            submitter,
            settings.invalidation.clone(),
        )?;
        Ok(Self {
            catalog,
            invalidator,
        })
    }

    /// Invalidate cached prices for the written items.
    ///
    /// Flags are persisted only once the whole run succeeded.
    pub fn after_write(&self, item_ids: &[PricelistItemId]) -> Result<InvalidationReport, HookError> {
        let mut items = self.catalog.load_items(item_ids)?;
        let report = self.invalidator.update_product_pricelist_cache(&mut items)?;

        let saved = self
            .catalog
            .save_skipped_flags(items.iter().filter(|i| i.cache_update_skipped()))?;
        if saved > 0 {
            info!(saved, "persisted pricelist cache skip flags");
        }
        Ok(report)
    }
}
