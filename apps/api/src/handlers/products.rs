use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use catalog_application::{PageRequest, ProductListQuery};
use catalog_domain::{CategoryId, ProductDraft, ProductId};

use crate::dto::{
    ListProductsQuery, PageQuery, ProductPageResponse, ProductRequest, ProductResponse,
    SearchProductsQuery,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_products_handler(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<Json<ProductPageResponse>> {
    let query = ProductListQuery::try_from(query)?;
    let page_request = query.page;
    let page = state.product_service.list_products(query).await?;

    Ok(Json(ProductPageResponse::new(page, page_request)))
}

pub async fn search_products_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchProductsQuery>,
) -> ApiResult<Json<ProductPageResponse>> {
    let page_request = PageRequest::new(query.offset, query.limit)?;
    let term = query.q.unwrap_or_default();
    let page = state
        .product_service
        .search_products(term.as_str(), page_request)
        .await?;

    Ok(Json(ProductPageResponse::new(page, page_request)))
}

pub async fn list_category_products_handler(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ProductPageResponse>> {
    let page_request = PageRequest::new(query.offset, query.limit)?;
    let page = state
        .product_service
        .list_category_products(CategoryId::new(category_id)?, page_request)
        .await?;

    Ok(Json(ProductPageResponse::new(page, page_request)))
}

pub async fn get_product_handler(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state
        .product_service
        .get_product(ProductId::parse(product_id.as_str())?)
        .await?;

    Ok(Json(ProductResponse::from(product)))
}

pub async fn create_product_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProductRequest>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let product = state
        .product_service
        .create_product(ProductDraft::try_from(payload)?)
        .await?;

    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

pub async fn update_product_handler(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Json(payload): Json<ProductRequest>,
) -> ApiResult<Json<ProductResponse>> {
    let product_id = ProductId::parse(product_id.as_str())?;
    let product = state
        .product_service
        .update_product(product_id, ProductDraft::try_from(payload)?)
        .await?;

    Ok(Json(ProductResponse::from(product)))
}

pub async fn delete_product_handler(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .product_service
        .delete_product(ProductId::parse(product_id.as_str())?)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
