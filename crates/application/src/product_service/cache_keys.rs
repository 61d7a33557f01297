use catalog_domain::{CategoryId, ProductId};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::product_ports::{PageRequest, ProductListQuery};

/// Every cached listing lives under this pattern.
pub(super) const LISTINGS_PATTERN: &str = "products:*";

pub(super) fn product(product_id: ProductId) -> String {
    format!("product:{product_id}")
}

pub(super) fn list(query: &ProductListQuery) -> String {
    format!("products:list:{}", digest(query))
}

pub(super) fn category(category_id: &CategoryId, page: PageRequest) -> String {
    format!(
        "products:category:{category_id}:{}:{}",
        page.offset, page.limit
    )
}

pub(super) fn search(term: &str, page: PageRequest) -> String {
    format!("products:search:{}", digest(&(term, page)))
}

fn digest<T: Serialize>(value: &T) -> String {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    let hash = Sha256::digest(encoded);
    hash.iter().map(|byte| format!("{byte:02x}")).collect()
}
