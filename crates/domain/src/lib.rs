//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod category_count;
mod product;
mod product_event;
pub mod topics;

pub use category_count::{AdjustmentDirection, CategoryCountAdjustment};
pub use product::{
    CategoryId, PRODUCT_NAME_MAX_LENGTH, Product, ProductDraft, ProductId,
};
pub use product_event::{ProductCreated, ProductDeleted, ProductEvent, ProductUpdated};
