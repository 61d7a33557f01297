use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{AppError, AppResult};
use catalog_domain::{CategoryId, Product, ProductDraft, ProductId, topics};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::event_dispatcher::{ConnectRetryPolicy, EventDispatcher};
use crate::keyed_store_ports::KeyedStore;
use crate::product_ports::{
    PageRequest, ProductFilter, ProductListQuery, ProductPage, ProductRepository, ProductUpdate,
};
use crate::read_through_cache::{CachePolicy, CacheTtls, ReadThroughCache};
use crate::test_support::{FakeKeyedStore, RecordingPublisher, category};

use super::ProductService;

#[derive(Default)]
struct FakeProductRepository {
    products: Mutex<HashMap<ProductId, Product>>,
    find_by_id_calls: AtomicUsize,
    find_many_calls: AtomicUsize,
    moved_by_other_writer: Mutex<Option<CategoryId>>,
}

#[async_trait]
impl ProductRepository for FakeProductRepository {
    async fn find_by_id(&self, product_id: ProductId) -> AppResult<Option<Product>> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.lock().await.get(&product_id).cloned())
    }

    async fn find_many(&self, query: &ProductListQuery) -> AppResult<ProductPage> {
        self.find_many_calls.fetch_add(1, Ordering::SeqCst);
        let items = self
            .products
            .lock()
            .await
            .values()
            .filter(|product| query.filter.matches(product))
            .cloned()
            .collect::<Vec<_>>();
        Ok(ProductPage {
            total: items.len() as u64,
            items,
        })
    }

    async fn create(&self, draft: &ProductDraft) -> AppResult<Product> {
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
        self.products.lock().await.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> AppResult<ProductUpdate> {
        let moved_by_other_writer = self.moved_by_other_writer.lock().await.take();
        let mut products = self.products.lock().await;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::NotFound(format!("product '{product_id}' not found")))?;
        if let Some(category_id) = moved_by_other_writer {
            product.category_id = category_id;
            product.version += 1;
        }
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
            .lock()
            .await
            .remove(&product_id)
            .ok_or_else(|| AppError::NotFound(format!("product '{product_id}' not found")))
    }
}

struct Harness {
    service: ProductService,
    repository: Arc<FakeProductRepository>,
    store: Arc<FakeKeyedStore>,
    publisher: Arc<RecordingPublisher>,
}

fn harness() -> Harness {
    let repository = Arc::new(FakeProductRepository::default());
    let store = Arc::new(FakeKeyedStore::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let cache = ReadThroughCache::new(
        store.clone(),
        CachePolicy {
            lock_lease: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(10),
        },
    );
    let dispatcher = EventDispatcher::new(
        publisher.clone(),
        ConnectRetryPolicy {
            attempts: 1,
            backoff: Duration::from_millis(1),
        },
    );

    Harness {
        service: ProductService::new(repository.clone(), cache, CacheTtls::default(), dispatcher),
        repository,
        store,
        publisher,
    }
}

fn draft(name: &str, category_id: &str) -> ProductDraft {
    let draft = ProductDraft::new(name, None, 25.0, category_id);
    assert!(draft.is_ok());
    draft.unwrap_or_else(|_| unreachable!())
}

async fn create(harness: &Harness, name: &str, category_id: &str) -> Product {
    let created = harness.service.create_product(draft(name, category_id)).await;
    assert!(created.is_ok());
    created.unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn create_publishes_and_seeds_the_entity_cache() {
    let harness = harness();

    let product = create(&harness, "Desk Lamp", "lighting").await;

    let created = harness.publisher.published_on(topics::PRODUCT_CREATED);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].key, product.id.to_string());
    assert!(harness.store.entry(&format!("product:{}", product.id)).is_some());
}

#[tokio::test]
async fn repeated_reads_hit_the_cache() {
    let harness = harness();
    let product = create(&harness, "Desk Lamp", "lighting").await;
    harness.store.del(&format!("product:{}", product.id)).await;

    let first = harness.service.get_product(product.id).await;
    let second = harness.service.get_product(product.id).await;

    assert_eq!(first.ok().map(|found| found.id), Some(product.id));
    assert_eq!(second.ok().map(|found| found.name), Some("Desk Lamp".to_owned()));
    assert_eq!(harness.repository.find_by_id_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_product_is_not_found_and_not_cached() {
    let harness = harness();
    let product_id = ProductId::new();

    let result = harness.service.get_product(product_id).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(harness.store.entry(&format!("product:{product_id}")).is_none());
}

#[tokio::test]
async fn update_announces_the_previous_category() {
    let harness = harness();
    let product = create(&harness, "Desk Lamp", "lighting").await;

    let updated = harness
        .service
        .update_product(product.id, draft("Desk Lamp XL", "furniture"))
        .await;

    assert_eq!(updated.ok().map(|updated| updated.version), Some(2));
    let events = harness.publisher.published_on(topics::PRODUCT_UPDATED);
    assert_eq!(events.len(), 1);
    assert!(events[0].payload.contains("\"oldCategoryId\":\"lighting\""));
    assert!(events[0].payload.contains("\"categoryId\":\"furniture\""));
}

#[tokio::test]
async fn update_announces_the_category_left_by_this_write() {
    let harness = harness();
    let product = create(&harness, "Desk Lamp", "lighting").await;
    *harness.repository.moved_by_other_writer.lock().await = Some(category("outdoor"));

    let updated = harness
        .service
        .update_product(product.id, draft("Desk Lamp", "furniture"))
        .await;

    assert_eq!(updated.ok().map(|updated| updated.version), Some(3));
    let events = harness.publisher.published_on(topics::PRODUCT_UPDATED);
    assert_eq!(events.len(), 1);
    assert!(events[0].payload.contains("\"oldCategoryId\":\"outdoor\""));
    assert_eq!(harness.repository.find_by_id_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn update_of_unknown_product_is_not_found() {
    let harness = harness();

    let result = harness
        .service
        .update_product(ProductId::new(), draft("Ghost", "lighting"))
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(harness.publisher.published().is_empty());
}

#[tokio::test]
async fn writes_drop_cached_listings() {
    let harness = harness();
    create(&harness, "Desk Lamp", "lighting").await;

    let before = harness.service.list_products(ProductListQuery::default()).await;
    assert_eq!(before.ok().map(|page| page.total), Some(1));

    create(&harness, "Floor Lamp", "lighting").await;
    let after = harness.service.list_products(ProductListQuery::default()).await;

    assert_eq!(after.ok().map(|page| page.total), Some(2));
    assert_eq!(harness.repository.find_many_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn publish_failure_is_reported_but_the_product_is_kept() {
    let harness = harness();
    harness.publisher.fail_topic(topics::PRODUCT_CREATED);

    let result = harness
        .service
        .create_product(draft("Desk Lamp", "lighting"))
        .await;

    assert!(matches!(result, Err(AppError::Unavailable(_))));
    let stored = harness.repository.products.lock().await.len();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn delete_removes_the_entry_and_announces_it() {
    let harness = harness();
    let product = create(&harness, "Desk Lamp", "lighting").await;

    let deleted = harness.service.delete_product(product.id).await;

    assert_eq!(deleted.ok().map(|deleted| deleted.id), Some(product.id));
    assert!(harness.store.entry(&format!("product:{}", product.id)).is_none());
    assert_eq!(
        harness.publisher.published_on(topics::PRODUCT_DELETED).len(),
        1
    );
    assert!(matches!(
        harness.service.get_product(product.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn listing_rejects_inverted_price_bounds() {
    let harness = harness();
    let query = ProductListQuery {
        filter: ProductFilter {
            min_price: Some(50.0),
            max_price: Some(10.0),
            ..ProductFilter::default()
        },
        ..ProductListQuery::default()
    };

    let result = harness.service.list_products(query).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn search_validates_and_matches_case_insensitively() {
    let harness = harness();
    create(&harness, "Desk Lamp", "lighting").await;
    create(&harness, "Oak Table", "furniture").await;

    assert!(matches!(
        harness.service.search_products("   ", PageRequest::default()).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        harness
            .service
            .search_products(&"x".repeat(101), PageRequest::default())
            .await,
        Err(AppError::Validation(_))
    ));

    let found = harness
        .service
        .search_products("LAMP", PageRequest::default())
        .await;
    assert_eq!(
        found.ok().map(|page| page.items.into_iter().map(|p| p.name).collect::<Vec<_>>()),
        Some(vec!["Desk Lamp".to_owned()])
    );
}

#[tokio::test]
async fn category_listing_only_returns_that_category() {
    let harness = harness();
    create(&harness, "Desk Lamp", "lighting").await;
    create(&harness, "Oak Table", "furniture").await;

    let page = harness
        .service
        .list_category_products(crate::test_support::category("furniture"), PageRequest::default())
        .await;

    assert_eq!(page.ok().map(|page| page.total), Some(1));
}
