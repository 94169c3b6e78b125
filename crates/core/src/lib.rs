//! `pricecache-core` — shared building blocks for the pricelist cache crates.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, CompanyId, PricelistId, PricelistItemId, ProductId, ProductTemplateId};
