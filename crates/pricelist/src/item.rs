use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricecache_core::{
    CategoryId, CompanyId, DomainError, Entity, PricelistId, PricelistItemId, ProductId,
    ProductTemplateId,
};

/// What a pricelist item applies to.
///
/// Serialized with the stable storage codes (`0_product_variant`, ...) so
/// records round-trip with the rows they were loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppliedOn {
    #[serde(rename = "0_product_variant")]
    ProductVariant,
    #[serde(rename = "1_product")]
    Product,
    #[serde(rename = "2_product_category")]
    ProductCategory,
    #[serde(rename = "3_global")]
    Global,
}

impl AppliedOn {
    pub fn as_code(&self) -> &'static str {
        match self {
            AppliedOn::ProductVariant => "0_product_variant",
            AppliedOn::Product => "1_product",
            AppliedOn::ProductCategory => "2_product_category",
            AppliedOn::Global => "3_global",
        }
    }

    /// Only variant- and product-scoped items map to a concrete product list.
    pub fn triggers_cache_update(&self) -> bool {
        matches!(self, AppliedOn::ProductVariant | AppliedOn::Product)
    }
}

impl core::fmt::Display for AppliedOn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_code())
    }
}

impl core::str::FromStr for AppliedOn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0_product_variant" => Ok(AppliedOn::ProductVariant),
            "1_product" => Ok(AppliedOn::Product),
            "2_product_category" => Ok(AppliedOn::ProductCategory),
            "3_global" => Ok(AppliedOn::Global),
            other => Err(DomainError::validation(format!(
                "unknown applied_on code: {other}"
            ))),
        }
    }
}

/// Which products an item targets, derived from its template/product fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSelector {
    /// Every variant of the template. Wins over an explicit product.
    Template(ProductTemplateId),
    Variant(ProductId),
    None,
}

/// A pricelist item (pricing rule) as loaded from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricelistItem {
    id: PricelistItemId,
    pricelist_id: PricelistId,
    applied_on: AppliedOn,
    product_tmpl_id: Option<ProductTemplateId>,
    product_id: Option<ProductId>,
    categ_id: Option<CategoryId>,
    base_pricelist_id: Option<PricelistId>,
    company_id: Option<CompanyId>,
    min_quantity: f64,
    date_start: Option<DateTime<Utc>>,
    date_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pricelist_cache_update_skipped: bool,
}

impl PricelistItem {
    pub fn new(id: PricelistItemId, pricelist_id: PricelistId, applied_on: AppliedOn) -> Self {
        Self {
            id,
            pricelist_id,
            applied_on,
            product_tmpl_id: None,
            product_id: None,
            categ_id: None,
            base_pricelist_id: None,
            company_id: None,
            min_quantity: 0.0,
            date_start: None,
            date_end: None,
            pricelist_cache_update_skipped: false,
        }
    }

    pub fn with_template(mut self, template: ProductTemplateId) -> Self {
        self.product_tmpl_id = Some(template);
        self
    }

    pub fn with_product(mut self, product: ProductId) -> Self {
        self.product_id = Some(product);
        self
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.categ_id = Some(category);
        self
    }

    /// Price is computed from another pricelist.
    pub fn with_base_pricelist(mut self, base: PricelistId) -> Self {
        self.base_pricelist_id = Some(base);
        self
    }

    pub fn with_company(mut self, company: CompanyId) -> Self {
        self.company_id = Some(company);
        self
    }

    pub fn with_min_quantity(mut self, min_quantity: f64) -> Self {
        self.min_quantity = min_quantity;
        self
    }

    pub fn with_date_start(mut self, at: DateTime<Utc>) -> Self {
        self.date_start = Some(at);
        self
    }

    pub fn with_date_end(mut self, at: DateTime<Utc>) -> Self {
        self.date_end = Some(at);
        self
    }

    pub fn id_typed(&self) -> PricelistItemId {
        self.id
    }

    pub fn pricelist_id(&self) -> PricelistId {
        self.pricelist_id
    }

    pub fn applied_on(&self) -> AppliedOn {
        self.applied_on
    }

    pub fn product_tmpl_id(&self) -> Option<ProductTemplateId> {
        self.product_tmpl_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn categ_id(&self) -> Option<CategoryId> {
        self.categ_id
    }

    pub fn base_pricelist_id(&self) -> Option<PricelistId> {
        self.base_pricelist_id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn min_quantity(&self) -> f64 {
        self.min_quantity
    }

    pub fn date_start(&self) -> Option<DateTime<Utc>> {
        self.date_start
    }

    pub fn date_end(&self) -> Option<DateTime<Utc>> {
        self.date_end
    }

    pub fn cache_update_skipped(&self) -> bool {
        self.pricelist_cache_update_skipped
    }

    /// Whether the item's validity is bounded in time.
    pub fn has_date_range(&self) -> bool {
        self.date_start.is_some() || self.date_end.is_some()
    }

    pub fn product_selector(&self) -> ProductSelector {
        match (self.product_tmpl_id, self.product_id) {
            (Some(template), _) => ProductSelector::Template(template),
            (None, Some(product)) => ProductSelector::Variant(product),
            (None, None) => ProductSelector::None,
        }
    }

    pub fn mark_cache_update_skipped(&mut self) {
        self.pricelist_cache_update_skipped = true;
    }

    pub fn set_cache_update_skipped(&mut self, skipped: bool) {
        self.pricelist_cache_update_skipped = skipped;
    }
}

impl Entity for PricelistItem {
    type Id = PricelistItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
