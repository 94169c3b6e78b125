//! Pricelist cache invalidation.
//!
//! When pricelist items change, the cached prices of the products they target
//! go stale. This module decides which changed items need a recomputation and
//! fans the work out as bounded-size jobs:
//!
//! 1. keep items applied on a variant or a product
//! 2. skip (and flag) items whose recursive item tree is date-bounded, since a
//!    static cache has no time dimension
//! 3. group the affected products per pricelist
//! 4. split every group into batches of at most `product_batch` ids and submit
//!    one [`CacheUpdateJob`] per batch
//!
//! Submission is fire-and-forget. Jobs may run in any order and concurrently;
//! the cache engine owns idempotency.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use pricecache_core::{DomainError, DomainResult, PricelistId, PricelistItemId, ProductId};

use crate::error::InvalidationError;
use crate::item::{PricelistItem, ProductSelector};
use crate::ports::{CacheUpdateJob, CacheUpdateSubmitter, RuleResolver, VariantResolver};

/// Default maximum number of product ids per cache update job.
pub const PRODUCT_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidatorConfig {
    /// Maximum product ids per submitted job.
    #[serde(default = "default_product_batch")]
    pub product_batch: usize,
}

fn default_product_batch() -> usize {
    PRODUCT_BATCH
}

impl Default for InvalidatorConfig {
    fn default() -> Self {
        Self {
            product_batch: PRODUCT_BATCH,
        }
    }
}

impl InvalidatorConfig {
    pub fn with_product_batch(mut self, product_batch: usize) -> Self {
        self.product_batch = product_batch;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.product_batch == 0 {
            return Err(DomainError::validation("product_batch must be at least 1"));
        }
        Ok(())
    }
}

/// Whether any item in the collection is bounded by a start or end date.
pub fn has_date_range<'a, I>(items: I) -> bool
where
    I: IntoIterator<Item = &'a PricelistItem>,
{
    items.into_iter().any(PricelistItem::has_date_range)
}

/// Product ids targeted by a single item.
///
/// A template selects all of its variants, even when the item also names an
/// explicit product. Items selecting nothing yield an empty list.
pub fn resolve_affected_products<V>(
    item: &PricelistItem,
    variants: &V,
) -> Result<Vec<ProductId>, InvalidationError>
where
    V: VariantResolver + ?Sized,
{
    match item.product_selector() {
        ProductSelector::Template(template) => {
            variants
                .variant_ids(template)
                .map_err(|source| InvalidationError::Variants {
                    item: item.id_typed(),
                    template,
                    source,
                })
        }
        ProductSelector::Variant(product) => Ok(vec![product]),
        ProductSelector::None => Ok(Vec::new()),
    }
}

/// Affected product ids keyed by pricelist, in first-seen pricelist order.
///
/// Ids are concatenated per item without deduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricelistProductGroups {
    groups: Vec<(PricelistId, Vec<ProductId>)>,
    index: HashMap<PricelistId, usize>,
}

impl PricelistProductGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I>(&mut self, pricelist_id: PricelistId, product_ids: I)
    where
        I: IntoIterator<Item = ProductId>,
    {
        let slot = match self.index.get(&pricelist_id) {
            Some(&slot) => slot,
            None => {
                self.groups.push((pricelist_id, Vec::new()));
                self.index.insert(pricelist_id, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].1.extend(product_ids);
    }

    pub fn get(&self, pricelist_id: PricelistId) -> Option<&[ProductId]> {
        self.index
            .get(&pricelist_id)
            .map(|&slot| self.groups[slot].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (PricelistId, &[ProductId])> + '_ {
        self.groups.iter().map(|(id, products)| (*id, products.as_slice()))
    }

    /// Number of pricelists.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Group the products of every item under the item's pricelist.
///
/// Each item contributes its own products; nothing is overwritten across items.
pub fn group_products_by_pricelist<'a, I, V>(
    items: I,
    variants: &V,
) -> Result<PricelistProductGroups, InvalidationError>
where
    I: IntoIterator<Item = &'a PricelistItem>,
    V: VariantResolver + ?Sized,
{
    let mut groups = PricelistProductGroups::new();
    for item in items {
        let products = resolve_affected_products(item, variants)?;
        groups.extend(item.pricelist_id(), products);
    }
    Ok(groups)
}

/// Split every group into consecutive batches of at most `product_batch` ids.
///
/// Jobs come out in group order, then batch order, so concatenating the
/// `product_ids` of one pricelist's jobs reproduces its group exactly.
pub fn plan_cache_update_jobs(
    groups: &PricelistProductGroups,
    product_batch: usize,
) -> Vec<CacheUpdateJob> {
    let size = product_batch.max(1);
    groups
        .iter()
        .flat_map(|(pricelist_id, product_ids)| {
            product_ids
                .chunks(size)
                .map(move |chunk| CacheUpdateJob::for_pricelist(pricelist_id, chunk))
        })
        .collect()
}

/// Outcome of one invalidation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Items applied on a variant or product.
    pub considered: usize,
    /// Items flagged `pricelist_cache_update_skipped`.
    pub skipped: Vec<PricelistItemId>,
    pub jobs_submitted: usize,
}

/// Entry point for cache invalidation after pricelist items are written.
pub struct PricelistCacheInvalidator<R, V, S> {
    resolver: R,
    variants: V,
    submitter: S,
    config: InvalidatorConfig,
}

impl<R, V, S> PricelistCacheInvalidator<R, V, S>
where
    R: RuleResolver,
    V: VariantResolver,
    S: CacheUpdateSubmitter,
{
    pub fn new(resolver: R, variants: V, submitter: S, config: InvalidatorConfig) -> DomainResult<Self> {
        config.validate()?;
        Ok(Self {
            resolver,
            variants,
            submitter,
            config,
        })
    }

    pub fn config(&self) -> &InvalidatorConfig {
        &self.config
    }

    /// Schedule cache recomputation for the given changed items.
    ///
    /// Date-bounded items are flagged in place; the caller persists the flag.
    /// Collaborator failures propagate unchanged. Flags set before the failure
    /// stay set and jobs already submitted stay submitted; the surrounding
    /// transaction decides what to roll back.
    pub fn update_product_pricelist_cache(
        &self,
        items: &mut [PricelistItem],
    ) -> Result<InvalidationReport, InvalidationError> {
        let span = info_span!("pricelist_cache.invalidate", items = items.len());
        let _enter = span.enter();

        let mut report = InvalidationReport::default();
        let mut selected = Vec::new();

        for (pos, item) in items.iter_mut().enumerate() {
            if !item.applied_on().triggers_cache_update() {
                continue;
            }
            report.considered += 1;

            let tree = self
                .resolver
                .recursive_items(item.pricelist_id(), item.product_id())
                .map_err(|source| InvalidationError::Resolution {
                    item: item.id_typed(),
                    pricelist: item.pricelist_id(),
                    source,
                })?;

            if has_date_range(&tree) {
                item.mark_cache_update_skipped();
                report.skipped.push(item.id_typed());
                debug!(
                    item_id = %item.id_typed(),
                    pricelist_id = %item.pricelist_id(),
                    "item tree is date-based, skipping cache update"
                );
                continue;
            }
            selected.push(pos);
        }

        let items: &[PricelistItem] = items;
        let groups =
            group_products_by_pricelist(selected.iter().map(|&pos| &items[pos]), &self.variants)?;

        for job in plan_cache_update_jobs(&groups, self.config.product_batch) {
            let pricelist = job.pricelist_ids[0];
            let batch_len = job.product_ids.len();
            if let Err(source) = self.submitter.submit(job) {
                warn!(pricelist_id = %pricelist, batch_len, error = %source, "cache update submission failed");
                return Err(InvalidationError::Submission {
                    pricelist,
                    batch_len,
                    source,
                });
            }
            debug!(pricelist_id = %pricelist, batch_len, "cache update submitted");
            report.jobs_submitted += 1;
        }

        info!(
            considered = report.considered,
            skipped = report.skipped.len(),
            jobs = report.jobs_submitted,
            "pricelist cache invalidation scheduled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use chrono::Utc;
    use pricecache_core::ProductTemplateId;

    use crate::error::BoxError;
    use crate::item::AppliedOn;

    /// Resolver returning a fixed tree per pricelist, defaulting to nothing.
    #[derive(Default)]
    struct StaticResolver {
        trees: HashMap<PricelistId, Vec<PricelistItem>>,
        fail: bool,
    }

    impl RuleResolver for StaticResolver {
        fn recursive_items(
            &self,
            pricelist_id: PricelistId,
            _product_id: Option<ProductId>,
        ) -> Result<Vec<PricelistItem>, BoxError> {
            if self.fail {
                return Err("resolver offline".into());
            }
            Ok(self.trees.get(&pricelist_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct StaticVariants(HashMap<ProductTemplateId, Vec<ProductId>>);

    impl VariantResolver for StaticVariants {
        fn variant_ids(&self, template_id: ProductTemplateId) -> Result<Vec<ProductId>, BoxError> {
            Ok(self.0.get(&template_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingSubmitter {
        jobs: Mutex<Vec<CacheUpdateJob>>,
        fail_after: Option<usize>,
    }

    impl RecordingSubmitter {
        fn jobs(&self) -> Vec<CacheUpdateJob> {
            self.jobs.lock().unwrap().clone()
        }
    }

    impl CacheUpdateSubmitter for RecordingSubmitter {
        fn submit(&self, job: CacheUpdateJob) -> Result<(), BoxError> {
            let mut jobs = self.jobs.lock().unwrap();
            if self.fail_after.is_some_and(|n| jobs.len() >= n) {
                return Err("queue full".into());
            }
            jobs.push(job);
            Ok(())
        }
    }

    fn pid(raw: u64) -> ProductId {
        ProductId::new(raw)
    }

    fn item(id: u64, pricelist: u64, applied_on: AppliedOn) -> PricelistItem {
        PricelistItem::new(PricelistItemId::new(id), PricelistId::new(pricelist), applied_on)
    }

    fn invalidator<'a>(
        resolver: &'a StaticResolver,
        variants: &'a StaticVariants,
        submitter: &'a RecordingSubmitter,
    ) -> PricelistCacheInvalidator<&'a StaticResolver, &'a StaticVariants, &'a RecordingSubmitter>
    {
        PricelistCacheInvalidator::new(resolver, variants, submitter, InvalidatorConfig::default())
            .unwrap()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = InvalidatorConfig::default().with_product_batch(0).validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let resolver = StaticResolver::default();
        let variants = StaticVariants::default();
        let submitter = RecordingSubmitter::default();
        let built = PricelistCacheInvalidator::new(
            &resolver,
            &variants,
            &submitter,
            InvalidatorConfig::default().with_product_batch(0),
        );
        assert!(built.is_err());
    }

    #[test]
    fn has_date_range_is_false_for_empty_collection() {
        assert!(!has_date_range(&Vec::<PricelistItem>::new()));
        let dated = item(1, 1, AppliedOn::Global).with_date_end(Utc::now());
        let plain = item(2, 1, AppliedOn::Global);
        assert!(has_date_range([&plain, &dated]));
        assert!(!has_date_range([&plain]));
    }

    #[test]
    fn template_items_resolve_to_all_variants() {
        let mut variants = StaticVariants::default();
        variants
            .0
            .insert(ProductTemplateId::new(5), vec![pid(1), pid(2), pid(3)]);

        let rule = item(1, 9, AppliedOn::Product)
            .with_template(ProductTemplateId::new(5))
            .with_product(pid(99));
        assert_eq!(
            resolve_affected_products(&rule, &variants).unwrap(),
            vec![pid(1), pid(2), pid(3)]
        );

        let rule = item(2, 9, AppliedOn::ProductVariant).with_product(pid(42));
        assert_eq!(resolve_affected_products(&rule, &variants).unwrap(), vec![pid(42)]);

        let rule = item(3, 9, AppliedOn::ProductVariant);
        assert!(resolve_affected_products(&rule, &variants).unwrap().is_empty());
    }

    #[test]
    fn grouping_concatenates_every_item_in_order() {
        let mut variants = StaticVariants::default();
        variants.0.insert(ProductTemplateId::new(5), vec![pid(1), pid(2)]);

        let items = vec![
            item(1, 7, AppliedOn::ProductVariant).with_product(pid(42)),
            item(2, 8, AppliedOn::ProductVariant).with_product(pid(10)),
            item(3, 7, AppliedOn::Product).with_template(ProductTemplateId::new(5)),
            item(4, 7, AppliedOn::ProductVariant).with_product(pid(42)),
        ];

        let groups = group_products_by_pricelist(&items, &variants).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups.get(PricelistId::new(7)).unwrap(),
            &[pid(42), pid(1), pid(2), pid(42)]
        );
        assert_eq!(groups.get(PricelistId::new(8)).unwrap(), &[pid(10)]);
        let order: Vec<_> = groups.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![PricelistId::new(7), PricelistId::new(8)]);
    }

    #[test]
    fn category_items_contribute_nothing() {
        let resolver = StaticResolver::default();
        let variants = StaticVariants::default();
        let submitter = RecordingSubmitter::default();
        let mut items = vec![
            item(1, 7, AppliedOn::Product).with_product(pid(42)),
            item(2, 7, AppliedOn::ProductCategory).with_product(pid(43)),
            item(3, 7, AppliedOn::Global),
        ];

        let report = invalidator(&resolver, &variants, &submitter)
            .update_product_pricelist_cache(&mut items)
            .unwrap();

        assert_eq!(report.considered, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(
            submitter.jobs(),
            vec![CacheUpdateJob {
                product_ids: vec![pid(42)],
                pricelist_ids: vec![PricelistId::new(7)],
            }]
        );
        assert!(items.iter().all(|i| !i.cache_update_skipped()));
    }

    #[test]
    fn date_based_tree_skips_the_item() {
        let mut resolver = StaticResolver::default();
        resolver.trees.insert(
            PricelistId::new(9),
            vec![
                item(10, 9, AppliedOn::Product),
                item(11, 9, AppliedOn::Global).with_date_start(Utc::now()),
            ],
        );
        let mut variants = StaticVariants::default();
        variants
            .0
            .insert(ProductTemplateId::new(3), vec![pid(1), pid(2), pid(3)]);
        let submitter = RecordingSubmitter::default();

        let mut items =
            vec![item(3, 9, AppliedOn::ProductVariant).with_template(ProductTemplateId::new(3))];
        let report = invalidator(&resolver, &variants, &submitter)
            .update_product_pricelist_cache(&mut items)
            .unwrap();

        assert!(items[0].cache_update_skipped());
        assert_eq!(report.skipped, vec![PricelistItemId::new(3)]);
        assert_eq!(report.jobs_submitted, 0);
        assert!(submitter.jobs().is_empty());
    }

    #[test]
    fn large_groups_are_split_into_ordered_batches() {
        let resolver = StaticResolver::default();
        let mut variants = StaticVariants::default();
        let products: Vec<_> = (1..=2500).map(pid).collect();
        variants.0.insert(ProductTemplateId::new(1), products.clone());
        let submitter = RecordingSubmitter::default();

        let mut items =
            vec![item(1, 3, AppliedOn::Product).with_template(ProductTemplateId::new(1))];
        let report = invalidator(&resolver, &variants, &submitter)
            .update_product_pricelist_cache(&mut items)
            .unwrap();

        let jobs = submitter.jobs();
        assert_eq!(report.jobs_submitted, 3);
        let sizes: Vec<_> = jobs.iter().map(|j| j.product_ids.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert!(jobs.iter().all(|j| j.pricelist_ids == vec![PricelistId::new(3)]));
        let rebuilt: Vec<_> = jobs.into_iter().flat_map(|j| j.product_ids).collect();
        assert_eq!(rebuilt, products);
    }

    #[test]
    fn resolver_failure_propagates() {
        let resolver = StaticResolver {
            fail: true,
            ..Default::default()
        };
        let variants = StaticVariants::default();
        let submitter = RecordingSubmitter::default();
        let mut items = vec![item(1, 7, AppliedOn::Product).with_product(pid(42))];

        let err = invalidator(&resolver, &variants, &submitter)
            .update_product_pricelist_cache(&mut items)
            .unwrap_err();
        assert!(matches!(
            err,
            InvalidationError::Resolution { item, .. } if item == PricelistItemId::new(1)
        ));
        assert!(submitter.jobs().is_empty());
    }

    #[test]
    fn submission_failure_propagates_after_accepted_jobs() {
        let resolver = StaticResolver::default();
        let variants = StaticVariants::default();
        let submitter = RecordingSubmitter {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut items = vec![
            item(1, 7, AppliedOn::Product).with_product(pid(42)),
            item(2, 8, AppliedOn::Product).with_product(pid(43)),
        ];

        let err = invalidator(&resolver, &variants, &submitter)
            .update_product_pricelist_cache(&mut items)
            .unwrap_err();
        assert!(matches!(
            err,
            InvalidationError::Submission { pricelist, batch_len: 1, .. }
                if pricelist == PricelistId::new(8)
        ));
        assert_eq!(submitter.jobs().len(), 1);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Batches are bounded, cover the group exactly and number ceil(n / batch).
            #[test]
            fn batching_preserves_products(
                raw in proptest::collection::vec(0u64..50, 0..400),
                batch in 1usize..64,
            ) {
                let products: Vec<_> = raw.into_iter().map(ProductId::new).collect();
                let mut groups = PricelistProductGroups::new();
                groups.extend(PricelistId::new(3), products.clone());

                let jobs = plan_cache_update_jobs(&groups, batch);

                let expected = if products.is_empty() { 0 } else { products.len().div_ceil(batch) };
                prop_assert_eq!(jobs.len(), expected);
                prop_assert!(jobs.iter().all(|j| !j.product_ids.is_empty() && j.product_ids.len() <= batch));
                let rebuilt: Vec<_> = jobs.into_iter().flat_map(|j| j.product_ids).collect();
                prop_assert_eq!(rebuilt, products);
            }

            /// Every considered item is either flagged or has its product in a job.
            #[test]
            fn every_item_is_skipped_or_submitted(
                specs in proptest::collection::vec((0u8..4, 1u64..4, proptest::bool::ANY), 1..40),
            ) {
                let mut resolver = StaticResolver::default();
                let mut items = Vec::new();
                for (n, (kind, pricelist, dated)) in specs.into_iter().enumerate() {
                    let applied_on = match kind {
                        0 => AppliedOn::ProductVariant,
                        1 => AppliedOn::Product,
                        2 => AppliedOn::ProductCategory,
                        _ => AppliedOn::Global,
                    };
                    let rule = item(n as u64, pricelist, applied_on).with_product(pid(n as u64));
                    if dated {
                        resolver
                            .trees
                            .entry(PricelistId::new(pricelist))
                            .or_default()
                            .push(rule.clone().with_date_end(Utc::now()));
                    }
                    items.push(rule);
                }
                let variants = StaticVariants::default();
                let submitter = RecordingSubmitter::default();

                invalidator(&resolver, &variants, &submitter)
                    .update_product_pricelist_cache(&mut items)
                    .unwrap();

                let jobs = submitter.jobs();
                for rule in &items {
                    let product = rule.product_id().unwrap();
                    let submitted = jobs.iter().filter(|j| {
                        j.pricelist_ids == vec![rule.pricelist_id()] && j.product_ids.contains(&product)
                    }).count();
                    if !rule.applied_on().triggers_cache_update() {
                        prop_assert!(!rule.cache_update_skipped());
                        prop_assert_eq!(submitted, 0);
                    } else if rule.cache_update_skipped() {
                        prop_assert_eq!(submitted, 0);
                    } else {
                        prop_assert_eq!(submitted, 1);
                    }
                }
            }
        }
    }
}
