use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use catalog_application::{
    ProductListQuery, ProductPage, ProductRepository, ProductSortField, ProductUpdate,
    SortDirection,
};
use catalog_core::{AppError, AppResult};
use catalog_domain::{Product, ProductDraft, ProductId};
use chrono::Utc;
use tokio::sync::RwLock;

/// In-memory product repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_taken(
    products: &HashMap<ProductId, Product>,
    name: &str,
    except: Option<ProductId>,
) -> bool {
    products.values().any(|product| {
        Some(product.id) != except && product.name.to_lowercase() == name.to_lowercase()
    })
}

fn compare(left: &Product, right: &Product, field: ProductSortField) -> Ordering {
    match field {
        ProductSortField::Name => left.name.cmp(&right.name),
        ProductSortField::Price => left.price.total_cmp(&right.price),
        ProductSortField::CreatedAt => left.created_at.cmp(&right.created_at),
        ProductSortField::UpdatedAt => left.updated_at.cmp(&right.updated_at),
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, product_id: ProductId) -> AppResult<Option<Product>> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }

    async fn find_many(&self, query: &ProductListQuery) -> AppResult<ProductPage> {
        let products = self.products.read().await;
        let mut matching = products
            .values()
            .filter(|product| query.filter.matches(product))
            .cloned()
            .collect::<Vec<_>>();

        matching.sort_by(|left, right| {
            let ordering = compare(left, right, query.sort_field);
            let ordering = match query.sort_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            ordering.then_with(|| left.id.as_uuid().cmp(&right.id.as_uuid()))
        });

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.page.limit).unwrap_or(usize::MAX);

        Ok(ProductPage {
            items: matching.into_iter().skip(offset).take(limit).collect(),
            total,
        })
    }

    async fn create(&self, draft: &ProductDraft) -> AppResult<Product> {
        let mut products = self.products.write().await;
        if name_taken(&products, draft.name(), None) {
            return Err(AppError::Conflict(format!(
                "a product named '{}' already exists",
                draft.name()
            )));
        }

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: draft.name().to_owned(),
            description: draft.description().map(str::to_owned),
            price: draft.price(),
            category_id: draft.category_id().clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> AppResult<ProductUpdate> {
        let mut products = self.products.write().await;
        if name_taken(&products, draft.name(), Some(product_id)) {
            return Err(AppError::Conflict(format!(
                "a product named '{}' already exists",
                draft.name()
            )));
        }

        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::NotFound(format!("product '{product_id}' not found")))?;
        let previous_category_id = product.category_id.clone();
        product.name = draft.name().to_owned();
        product.description = draft.description().map(str::to_owned);
        product.price = draft.price();
        product.category_id = draft.category_id().clone();
        product.version += 1;
        product.updated_at = Utc::now();

        Ok(ProductUpdate {
            product: product.clone(),
            previous_category_id,
        })
    }

    async fn delete(&self, product_id: ProductId) -> AppResult<Product> {
        self.products
            .write()
            .await
            .remove(&product_id)
            .ok_or_else(|| AppError::NotFound(format!("product '{product_id}' not found")))
    }
}
