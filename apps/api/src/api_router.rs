use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use catalog_application::RateLimitRule;
use tower_http::trace::TraceLayer;

use crate::api_config::RateLimitRules;
use crate::handlers;
use crate::middleware;
use crate::state::AppState;

pub fn build_router(app_state: AppState, rules: &RateLimitRules) -> Router {
    let read_routes = Router::new()
        .route("/api/products", get(handlers::products::list_products_handler))
        .route(
            "/api/products/{product_id}",
            get(handlers::products::get_product_handler),
        )
        .route(
            "/api/categories/{category_id}/products",
            get(handlers::products::list_category_products_handler),
        );

    let search_routes = Router::new().route(
        "/api/products/search",
        get(handlers::products::search_products_handler),
    );

    let write_routes = Router::new()
        .route(
            "/api/products",
            post(handlers::products::create_product_handler),
        )
        .route(
            "/api/products/{product_id}",
            put(handlers::products::update_product_handler)
                .delete(handlers::products::delete_product_handler),
        );

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(rate_limited(read_routes, &app_state, &rules.read))
        .merge(rate_limited(search_routes, &app_state, &rules.search))
        .merge(rate_limited(write_routes, &app_state, &rules.write))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn rate_limited(
    routes: Router<AppState>,
    app_state: &AppState,
    rule: &RateLimitRule,
) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum::Extension(rule.clone()))
}
