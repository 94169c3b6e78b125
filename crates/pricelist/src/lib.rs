//! Pricelist domain module.
//!
//! Holds the pricelist item (pricing rule) record and the logic that decides,
//! after items change, which cached prices must be recomputed. The computation
//! itself belongs to an external cache engine; this crate only plans and
//! submits the work through the ports in [`ports`]. No IO happens here.

pub mod error;
pub mod invalidation;
pub mod item;
pub mod ports;

pub use error::{BoxError, InvalidationError};
pub use invalidation::{
    group_products_by_pricelist, has_date_range, plan_cache_update_jobs,
    resolve_affected_products, InvalidationReport, InvalidatorConfig, PricelistCacheInvalidator,
    PricelistProductGroups, PRODUCT_BATCH,
};
pub use item::{AppliedOn, PricelistItem, ProductSelector};
pub use ports::{CacheUpdateJob, CacheUpdateSubmitter, RuleResolver, VariantResolver};
