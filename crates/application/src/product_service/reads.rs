use catalog_core::{AppError, AppResult};
use catalog_domain::{CategoryId, Product, ProductId};

use crate::product_ports::{
    PageRequest, ProductFilter, ProductListQuery, ProductPage, ProductSortField, SortDirection,
};

use super::{ProductService, cache_keys};

const SEARCH_TERM_MAX_LENGTH: usize = 100;

impl ProductService {
    /// Returns one product.
    pub async fn get_product(&self, product_id: ProductId) -> AppResult<Product> {
        let repository = self.repository.clone();
        self.cache
            .cached(
                &cache_keys::product(product_id),
                self.ttls.entity,
                move || async move {
                    repository.find_by_id(product_id).await?.ok_or_else(|| {
                        AppError::NotFound(format!("product '{product_id}' not found"))
                    })
                },
            )
            .await
    }

    /// Returns a filtered, ordered page of products.
    pub async fn list_products(&self, query: ProductListQuery) -> AppResult<ProductPage> {
        if let (Some(min), Some(max)) = (query.filter.min_price, query.filter.max_price) {
            if min > max {
                return Err(AppError::Validation(
                    "min_price must not exceed max_price".to_owned(),
                ));
            }
        }

        let key = cache_keys::list(&query);
        self.load_page(key.as_str(), self.ttls.list, query).await
    }

    /// Returns the products of one category ordered by name.
    pub async fn list_category_products(
        &self,
        category_id: CategoryId,
        page: PageRequest,
    ) -> AppResult<ProductPage> {
        let key = cache_keys::category(&category_id, page);
        let query = ProductListQuery {
            filter: ProductFilter {
                category_id: Some(category_id),
                ..ProductFilter::default()
            },
            sort_field: ProductSortField::Name,
            sort_direction: SortDirection::Asc,
            page,
        };

        self.load_page(key.as_str(), self.ttls.category_listing, query)
            .await
    }

    /// Returns products whose name contains `term`.
    pub async fn search_products(&self, term: &str, page: PageRequest) -> AppResult<ProductPage> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AppError::Validation(
                "search term must not be empty".to_owned(),
            ));
        }

        if term.chars().count() > SEARCH_TERM_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "search term must not exceed {SEARCH_TERM_MAX_LENGTH} characters"
            )));
        }

        let term = term.to_lowercase();
        let key = cache_keys::search(&term, page);
        let query = ProductListQuery {
            filter: ProductFilter {
                name_contains: Some(term),
                ..ProductFilter::default()
            },
            sort_field: ProductSortField::Name,
            sort_direction: SortDirection::Asc,
            page,
        };

        self.load_page(key.as_str(), self.ttls.search, query).await
    }

    async fn load_page(
        &self,
        key: &str,
        ttl: std::time::Duration,
        query: ProductListQuery,
    ) -> AppResult<ProductPage> {
        let repository = self.repository.clone();
        self.cache
            .cached(key, ttl, move || async move {
                repository.find_many(&query).await
            })
            .await
    }
}
