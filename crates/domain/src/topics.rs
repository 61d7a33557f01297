//! Topic names shared by producers and consumers.
//!
//! These strings are the wire contract between services and must not change.

/// Published after a product is created.
pub const PRODUCT_CREATED: &str = "product.created";

/// Published after a product is updated.
pub const PRODUCT_UPDATED: &str = "product.updated";

/// Published after a product is deleted.
pub const PRODUCT_DELETED: &str = "product.deleted";

/// Asks the category context to increment its product count.
pub const CATEGORY_PRODUCT_COUNT_INCREMENT: &str = "category.product.count.increment";

/// Asks the category context to decrement its product count.
pub const CATEGORY_PRODUCT_COUNT_DECREMENT: &str = "category.product.count.decrement";

/// All product lifecycle topics.
pub const PRODUCT_TOPICS: [&str; 3] = [PRODUCT_CREATED, PRODUCT_UPDATED, PRODUCT_DELETED];
