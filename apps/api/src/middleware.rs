use std::net::SocketAddr;

use axum::Extension;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use catalog_application::{RateLimitDecision, RateLimitRule, resolve_rate_limit_identifier};
use catalog_core::AppError;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the principal authenticated by the upstream gateway.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const WINDOW_HEADER: &str = "x-ratelimit-window";

pub async fn rate_limit(
    State(state): State<AppState>,
    Extension(rule): Extension<RateLimitRule>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = request_identifier(&request);
    let decision = state.rate_limit_service.check(&identifier, &rule).await;

    if !decision.allowed {
        info!(
            component = "rate_limiter",
            identifier,
            key_prefix = rule.key_prefix(),
            retry_after = decision.retry_after_seconds,
            "request rejected by rate limit"
        );
        return rejection_response(&decision);
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn request_identifier(request: &Request) -> String {
    let headers = request.headers();
    let peer_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip());

    resolve_rate_limit_identifier(
        header_str(headers, AUTHENTICATED_USER_HEADER),
        header_str(headers, FORWARDED_FOR_HEADER),
        peer_address,
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn rejection_response(decision: &RateLimitDecision) -> Response {
    let mut response = ApiError(AppError::RateLimited(format!(
        "too many requests, retry after {} seconds",
        decision.retry_after_seconds
    )))
    .into_response();

    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_seconds),
    );
    response
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let values = [
        (LIMIT_HEADER, HeaderValue::from(decision.total)),
        (REMAINING_HEADER, HeaderValue::from(decision.remaining)),
        (RESET_HEADER, HeaderValue::from(decision.reset_epoch_seconds())),
        (WINDOW_HEADER, HeaderValue::from(decision.window.as_secs())),
    ];

    for (name, value) in values {
        headers.insert(HeaderName::from_static(name), value);
    }
}
