use catalog_application::{
    PageRequest, ProductFilter, ProductListQuery, ProductPage, ProductSortField, SortDirection,
};
use catalog_core::AppError;
use catalog_domain::{CategoryId, Product, ProductDraft};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub keyed_store: &'static str,
}

/// Incoming payload for product creation and replacement.
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category_id: String,
}

impl TryFrom<ProductRequest> for ProductDraft {
    type Error = AppError;

    fn try_from(value: ProductRequest) -> Result<Self, Self::Error> {
        ProductDraft::new(value.name, value.description, value.price, value.category_id)
    }
}

/// Query string of the product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl TryFrom<ListProductsQuery> for ProductListQuery {
    type Error = AppError;

    fn try_from(value: ListProductsQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            filter: ProductFilter {
                category_id: value.category_id.map(CategoryId::new).transpose()?,
                name_contains: value
                    .name
                    .map(|name| name.trim().to_owned())
                    .filter(|name| !name.is_empty()),
                min_price: value.min_price,
                max_price: value.max_price,
            },
            sort_field: value
                .sort_by
                .as_deref()
                .map(ProductSortField::parse)
                .transpose()?
                .unwrap_or_default(),
            sort_direction: value
                .sort_direction
                .as_deref()
                .map(SortDirection::parse)
                .transpose()?
                .unwrap_or_default(),
            page: PageRequest::new(value.offset, value.limit)?,
        })
    }
}

/// Query string of the product search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchProductsQuery {
    pub q: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

/// Pagination query string.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

/// API representation of a product.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category_id: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(value: Product) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            description: value.description,
            price: value.price,
            category_id: value.category_id.as_str().to_owned(),
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// API representation of one page of products.
#[derive(Debug, Serialize)]
pub struct ProductPageResponse {
    pub items: Vec<ProductResponse>,
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}

impl ProductPageResponse {
    pub fn new(page: ProductPage, request: PageRequest) -> Self {
        Self {
            items: page.items.into_iter().map(ProductResponse::from).collect(),
            total: page.total,
            offset: request.offset,
            limit: request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use catalog_application::{ProductListQuery, ProductSortField, SortDirection};
    use catalog_core::AppError;

    use super::ListProductsQuery;

    #[test]
    fn listing_query_applies_defaults() {
        let query = ProductListQuery::try_from(ListProductsQuery::default());

        assert!(query.is_ok());
        let query = query.unwrap_or_else(|_| unreachable!());
        assert_eq!(query.sort_field, ProductSortField::CreatedAt);
        assert_eq!(query.sort_direction, SortDirection::Desc);
        assert_eq!(query.page.limit, 20);
    }

    #[test]
    fn listing_query_rejects_bad_input() {
        let oversized = ListProductsQuery {
            limit: Some(101),
            ..ListProductsQuery::default()
        };
        let unknown_sort = ListProductsQuery {
            sort_by: Some("color".to_owned()),
            ..ListProductsQuery::default()
        };

        assert!(matches!(
            ProductListQuery::try_from(oversized),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ProductListQuery::try_from(unknown_sort),
            Err(AppError::Validation(_))
        ));
    }
}
