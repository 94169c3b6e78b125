//! Invalidation error model.
//!
//! The pipeline has no failure modes of its own. Every variant wraps a
//! collaborator failure with the record context it happened on.

use thiserror::Error;

use pricecache_core::{PricelistId, PricelistItemId, ProductTemplateId};

/// Error type returned by collaborator ports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum InvalidationError {
    /// The recursive item lookup for a pricelist item failed.
    #[error("resolving item tree for item {item} on pricelist {pricelist} failed: {source}")]
    Resolution {
        item: PricelistItemId,
        pricelist: PricelistId,
        #[source]
        source: BoxError,
    },

    /// Loading the variants of a template failed.
    #[error("loading variants of template {template} for item {item} failed: {source}")]
    Variants {
        item: PricelistItemId,
        template: ProductTemplateId,
        #[source]
        source: BoxError,
    },

    /// The job system refused a cache update batch.
    #[error("submitting cache update ({batch_len} products) for pricelist {pricelist} failed: {source}")]
    Submission {
        pricelist: PricelistId,
        batch_len: usize,
        #[source]
        source: BoxError,
    },
}
