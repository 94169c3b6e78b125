//! Collaborator ports used by the invalidation pipeline.
//!
//! Storage lookups and the job system live outside this crate; adapters in
//! `pricecache-infra` implement these traits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pricecache_core::{PricelistId, ProductId, ProductTemplateId};

use crate::error::BoxError;
use crate::item::PricelistItem;

/// Resolves the full set of items consulted to price a product on a pricelist,
/// including items reached through base pricelists.
pub trait RuleResolver {
    fn recursive_items(
        &self,
        pricelist_id: PricelistId,
        product_id: Option<ProductId>,
    ) -> Result<Vec<PricelistItem>, BoxError>;
}

/// Looks up the variants of a product template.
pub trait VariantResolver {
    fn variant_ids(&self, template_id: ProductTemplateId) -> Result<Vec<ProductId>, BoxError>;
}

/// Hands a cache update to the asynchronous job system.
///
/// Fire-and-forget: `Ok` means the job was accepted, not that it ran.
pub trait CacheUpdateSubmitter {
    fn submit(&self, job: CacheUpdateJob) -> Result<(), BoxError>;
}

/// Payload of one asynchronous cache recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUpdateJob {
    pub product_ids: Vec<ProductId>,
    pub pricelist_ids: Vec<PricelistId>,
}

impl CacheUpdateJob {
    /// Name of the cache engine entry point the job calls.
    pub const METHOD: &'static str = "update_product_pricelist_cache";

    pub fn for_pricelist(pricelist_id: PricelistId, product_ids: &[ProductId]) -> Self {
        Self {
            product_ids: product_ids.to_vec(),
            pricelist_ids: vec![pricelist_id],
        }
    }
}

impl<T: RuleResolver + ?Sized> RuleResolver for &T {
    fn recursive_items(
        &self,
        pricelist_id: PricelistId,
        product_id: Option<ProductId>,
    ) -> Result<Vec<PricelistItem>, BoxError> {
        (**self).recursive_items(pricelist_id, product_id)
    }
}

impl<T: RuleResolver + ?Sized> RuleResolver for Arc<T> {
    fn recursive_items(
        &self,
        pricelist_id: PricelistId,
        product_id: Option<ProductId>,
    ) -> Result<Vec<PricelistItem>, BoxError> {
        (**self).recursive_items(pricelist_id, product_id)
    }
}

impl<T: VariantResolver + ?Sized> VariantResolver for &T {
    fn variant_ids(&self, template_id: ProductTemplateId) -> Result<Vec<ProductId>, BoxError> {
        (**self).variant_ids(template_id)
    }
}

impl<T: VariantResolver + ?Sized> VariantResolver for Arc<T> {
    fn variant_ids(&self, template_id: ProductTemplateId) -> Result<Vec<ProductId>, BoxError> {
        (**self).variant_ids(template_id)
    }
}

impl<T: CacheUpdateSubmitter + ?Sized> CacheUpdateSubmitter for &T {
    fn submit(&self, job: CacheUpdateJob) -> Result<(), BoxError> {
        (**self).submit(job)
    }
}

impl<T: CacheUpdateSubmitter + ?Sized> CacheUpdateSubmitter for Arc<T> {
    fn submit(&self, job: CacheUpdateJob) -> Result<(), BoxError> {
        (**self).submit(job)
    }
}
