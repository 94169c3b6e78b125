//! In-memory product catalog and pricelist item storage.
//!
//! Backs the resolver ports of the invalidation pipeline for tests, dev, and
//! hosts that keep the catalog in process. Items are read and written in id
//! order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use pricecache_core::{CategoryId, Entity, PricelistId, PricelistItemId, ProductId, ProductTemplateId};
use pricecache_pricelist::{AppliedOn, BoxError, PricelistItem, RuleResolver, VariantResolver};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("pricelist item not found: {0}")]
    ItemNotFound(PricelistItemId),
    #[error("product {product} already belongs to template {template}")]
    ProductConflict {
        product: ProductId,
        template: ProductTemplateId,
    },
    #[error("catalog storage error: {0}")]
    Storage(String),
}

impl<T> From<PoisonError<T>> for CatalogError {
    fn from(_: PoisonError<T>) -> Self {
        CatalogError::Storage("catalog lock poisoned".to_string())
    }
}

/// Product variant as seen by the pricing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductRecord {
    pub id: ProductId,
    pub template_id: ProductTemplateId,
    pub categ_id: Option<CategoryId>,
}

#[derive(Debug, Default)]
struct CatalogState {
    items: BTreeMap<PricelistItemId, PricelistItem>,
    products: HashMap<ProductId, ProductRecord>,
    /// Variants per template, in registration order.
    variants: HashMap<ProductTemplateId, Vec<ProductId>>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product variant under its template.
    pub fn add_product(&self, product: ProductRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write()?;
        if let Some(existing) = state.products.get(&product.id) {
            if existing.template_id != product.template_id {
                return Err(CatalogError::ProductConflict {
                    product: product.id,
                    template: existing.template_id,
                });
            }
        } else {
            state
                .variants
                .entry(product.template_id)
                .or_default()
                .push(product.id);
        }
        state.products.insert(product.id, product);
        Ok(())
    }

    pub fn upsert_item(&self, item: PricelistItem) -> Result<(), CatalogError> {
        let mut state = self.state.write()?;
        state.items.insert(*item.id(), item);
        Ok(())
    }

    pub fn get_item(&self, id: PricelistItemId) -> Result<Option<PricelistItem>, CatalogError> {
        Ok(self.state.read()?.items.get(&id).cloned())
    }

    /// Load items in the requested order. Fails on the first unknown id.
    pub fn load_items(&self, ids: &[PricelistItemId]) -> Result<Vec<PricelistItem>, CatalogError> {
        let state = self.state.read()?;
        ids.iter()
            .map(|id| {
                state
                    .items
                    .get(id)
                    .cloned()
                    .ok_or(CatalogError::ItemNotFound(*id))
            })
            .collect()
    }

    /// Persist the `pricelist_cache_update_skipped` flag of the given items.
    pub fn save_skipped_flags<'a, I>(&self, items: I) -> Result<usize, CatalogError>
    where
        I: IntoIterator<Item = &'a PricelistItem>,
    {
        let mut state = self.state.write()?;
        let mut saved = 0;
        for item in items {
            let stored = state
                .items
                .get_mut(&item.id_typed())
                .ok_or(CatalogError::ItemNotFound(item.id_typed()))?;
            stored.set_cache_update_skipped(item.cache_update_skipped());
            saved += 1;
        }
        Ok(saved)
    }

    fn applies_to(
        item: &PricelistItem,
        product: Option<ProductId>,
        record: Option<&ProductRecord>,
    ) -> bool {
        match item.applied_on() {
            AppliedOn::ProductVariant => product.is_some() && item.product_id() == product,
            AppliedOn::Product => {
                record.is_some_and(|r| item.product_tmpl_id() == Some(r.template_id))
            }
            AppliedOn::ProductCategory => {
                record.is_some_and(|r| r.categ_id.is_some() && item.categ_id() == r.categ_id)
            }
            AppliedOn::Global => true,
        }
    }
}

impl RuleResolver for InMemoryCatalog {
    /// Items of `pricelist_id` applying to `product_id`, followed transitively
    /// through `base_pricelist_id`. Each pricelist is visited once.
    fn recursive_items(
        &self,
        pricelist_id: PricelistId,
        product_id: Option<ProductId>,
    ) -> Result<Vec<PricelistItem>, BoxError> {
        let state = self.state.read().map_err(CatalogError::from)?;
        let record = product_id.and_then(|p| state.products.get(&p));

        let mut tree = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![pricelist_id];

        while let Some(pricelist) = pending.pop() {
            if !visited.insert(pricelist) {
                continue;
            }
            for item in state.items.values() {
                if item.pricelist_id() != pricelist || !Self::applies_to(item, product_id, record) {
                    continue;
                }
                if let Some(base) = item.base_pricelist_id() {
                    pending.push(base);
                }
                tree.push(item.clone());
            }
        }

        debug!(
            pricelist_id = %pricelist_id,
            pricelists = visited.len(),
            items = tree.len(),
            "resolved pricelist item tree"
        );
        Ok(tree)
    }
}

impl VariantResolver for InMemoryCatalog {
    fn variant_ids(&self, template_id: ProductTemplateId) -> Result<Vec<ProductId>, BoxError> {
        let state = self.state.read().map_err(CatalogError::from)?;
        Ok(state.variants.get(&template_id).cloned().unwrap_or_default())
    }
}
