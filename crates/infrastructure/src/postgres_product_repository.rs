use async_trait::async_trait;
use catalog_application::{
    ProductFilter, ProductListQuery, ProductPage, ProductRepository, ProductSortField,
    ProductUpdate, SortDirection,
};
use catalog_core::{AppError, AppResult};
use catalog_domain::{CategoryId, Product, ProductDraft, ProductId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, category_id, version, created_at, updated_at";

/// PostgreSQL-backed product repository.
#[derive(Clone)]
pub struct PostgresProductRepository {
    pool: PgPool,
}

impl PostgresProductRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    price: f64,
    category_id: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> AppResult<Self> {
        Ok(Self {
            id: ProductId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            price: row.price,
            category_id: CategoryId::new(row.category_id)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    category_id: String,
}

#[derive(Debug, FromRow)]
struct CountRow {
    total: i64,
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    builder.push(" WHERE TRUE");

    if let Some(category_id) = &filter.category_id {
        builder.push(" AND category_id = ");
        builder.push_bind(category_id.as_str().to_owned());
    }

    if let Some(needle) = &filter.name_contains {
        builder.push(" AND position(lower(");
        builder.push_bind(needle.clone());
        builder.push(") in lower(name)) > 0");
    }

    if let Some(min_price) = filter.min_price {
        builder.push(" AND price >= ");
        builder.push_bind(min_price);
    }

    if let Some(max_price) = filter.max_price {
        builder.push(" AND price <= ");
        builder.push_bind(max_price);
    }
}

fn sort_column(field: ProductSortField) -> &'static str {
    match field {
        ProductSortField::Name => "name",
        ProductSortField::Price => "price",
        ProductSortField::CreatedAt => "created_at",
        ProductSortField::UpdatedAt => "updated_at",
    }
}

fn sort_keyword(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

fn map_write_error(error: sqlx::Error, draft: &ProductDraft, action: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "a product named '{}' already exists",
            draft.name()
        ));
    }

    AppError::Internal(format!("failed to {action} product: {error}"))
}

#[async_trait]
impl ProductRepository for PostgresProductRepository {
    async fn find_by_id(&self, product_id: ProductId) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find product '{product_id}': {error}"))
        })?;

        row.map(Product::try_from).transpose()
    }

    async fn find_many(&self, query: &ProductListQuery) -> AppResult<ProductPage> {
        let mut count_builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM products");
        push_filter(&mut count_builder, &query.filter);
        let count = count_builder
            .build_query_as::<CountRow>()
            .fetch_one(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to count products: {error}")))?;

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filter(&mut builder, &query.filter);
        builder.push(" ORDER BY ");
        builder.push(sort_column(query.sort_field));
        builder.push(" ");
        builder.push(sort_keyword(query.sort_direction));
        builder.push(", id ASC LIMIT ");
        builder.push_bind(i64::from(query.page.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.page.offset));

        let rows = builder
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list products: {error}")))?;

        Ok(ProductPage {
            items: rows
                .into_iter()
                .map(Product::try_from)
                .collect::<AppResult<Vec<_>>>()?,
            total: u64::try_from(count.total).unwrap_or(0),
        })
    }

    async fn create(&self, draft: &ProductDraft) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (id, name, description, price, category_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(ProductId::new().as_uuid())
        .bind(draft.name())
        .bind(draft.description())
        .bind(draft.price())
        .bind(draft.category_id().as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_write_error(error, draft, "create"))?;

        Product::try_from(row)
    }

    async fn update(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> AppResult<ProductUpdate> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start update transaction for product '{product_id}': {error}"
            ))
        })?;

        let previous = sqlx::query_as::<_, CategoryRow>(
            "SELECT category_id FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to lock product '{product_id}': {error}"))
        })?
        .ok_or_else(|| AppError::NotFound(format!("product '{product_id}' not found")))?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET name = $2,
                description = $3,
                price = $4,
                category_id = $5,
                version = version + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(draft.name())
        .bind(draft.description())
        .bind(draft.price())
        .bind(draft.category_id().as_str())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| map_write_error(error, draft, "update"))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit update transaction for product '{product_id}': {error}"
            ))
        })?;

        Ok(ProductUpdate {
            product: Product::try_from(row)?,
            previous_category_id: CategoryId::new(previous.category_id)?,
        })
    }

    async fn delete(&self, product_id: ProductId) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "DELETE FROM products WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to delete product '{product_id}': {error}"))
        })?
        .ok_or_else(|| AppError::NotFound(format!("product '{product_id}' not found")))?;

        Product::try_from(row)
    }
}
