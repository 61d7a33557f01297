//! Store-of-record port for products and its query types.

use async_trait::async_trait;
use catalog_core::{AppError, AppResult};
use catalog_domain::{CategoryId, Product, ProductDraft, ProductId};
use serde::{Deserialize, Serialize};

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Column a product listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortField {
    /// Product name.
    Name,
    /// Unit price.
    Price,
    /// Creation time.
    #[default]
    CreatedAt,
    /// Last modification time.
    UpdatedAt,
}

impl ProductSortField {
    /// Parses a sort field name.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "name" => Ok(Self::Name),
            "price" => Ok(Self::Price),
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            _ => Err(AppError::Validation(format!(
                "unknown product sort field '{value}'"
            ))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl SortDirection {
    /// Parses a sort direction.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(AppError::Validation(format!(
                "unknown sort direction '{value}'"
            ))),
        }
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    /// Rows skipped.
    pub offset: u32,
    /// Rows returned.
    pub limit: u32,
}

impl PageRequest {
    /// Creates a validated page request.
    pub fn new(offset: Option<u32>, limit: Option<u32>) -> AppResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(AppError::Validation(format!(
                "page limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }

        Ok(Self {
            offset: offset.unwrap_or(0),
            limit,
        })
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Product filter; every present field must match.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProductFilter {
    /// Only products of this category.
    pub category_id: Option<CategoryId>,
    /// Case-insensitive name substring.
    pub name_contains: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    pub max_price: Option<f64>,
}

impl ProductFilter {
    /// Returns whether `product` satisfies the filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let category_matches = self
            .category_id
            .as_ref()
            .is_none_or(|category_id| *category_id == product.category_id);
        let name_matches = self.name_contains.as_ref().is_none_or(|needle| {
            product
                .name
                .to_lowercase()
                .contains(needle.to_lowercase().as_str())
        });
        let min_matches = self.min_price.is_none_or(|min| product.price >= min);
        let max_matches = self.max_price.is_none_or(|max| product.price <= max);

        category_matches && name_matches && min_matches && max_matches
    }
}

/// Product listing request.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProductListQuery {
    /// Row filter.
    pub filter: ProductFilter,
    /// Ordering column.
    pub sort_field: ProductSortField,
    /// Ordering direction.
    pub sort_direction: SortDirection,
    /// Pagination window.
    pub page: PageRequest,
}

/// One page of products.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProductPage {
    /// Products on this page.
    pub items: Vec<Product>,
    /// Products matching the filter across all pages.
    pub total: u64,
}

/// Outcome of an update: the stored product and the category it was in
/// immediately before this write.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpdate {
    /// Product after the update.
    pub product: Product,
    /// Category read under the same lock as the write.
    pub previous_category_id: CategoryId,
}

/// Repository port for the product store of record.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Returns one product.
    async fn find_by_id(&self, product_id: ProductId) -> AppResult<Option<Product>>;

    /// Returns a filtered, ordered page of products.
    async fn find_many(&self, query: &ProductListQuery) -> AppResult<ProductPage>;

    /// Stores a new product at version 1.
    async fn create(&self, draft: &ProductDraft) -> AppResult<Product>;

    /// Replaces a product's attributes and bumps its version.
    ///
    /// The previous category must be captured atomically with the write so
    /// concurrent moves each report the category they actually left.
    async fn update(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> AppResult<ProductUpdate>;

    /// Removes a product and returns its last state.
    async fn delete(&self, product_id: ProductId) -> AppResult<Product>;
}
