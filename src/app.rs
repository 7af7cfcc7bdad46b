// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Application state, client address resolution, route handlers, and router
//! construction.
//!
//! This module is `pub` so that integration tests can build a test router directly
//! without starting the full binary.

use crate::config::AllowedOrigin;
use crate::error::ApiError;
use crate::models::query::{
    ErrorResponse, FirearmStatusRequest, FirearmStatusResponse, Query, QueryEcho,
};
use crate::models::version::{HealthResponse, VersionResponse};
use crate::services::logging::{describe_serial, mask_reference};
use crate::services::rate_limit::{RateDecision, RateLimiter};
use crate::services::upstream::UpstreamClient;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument};
use utoipa::OpenApi;
use uuid::Uuid;

/// Application version extracted from `Cargo.toml` at compile time.
/// The patch segment can be overridden via `FIREARM_STATUS_PATCH_VERSION` (see `build.rs`).
pub const VERSION: &str = env!("FIREARM_STATUS_VERSION");

/// Primary lookup route.
pub const STATUS_ROUTE: &str = "/api/firearm-status";
/// Alternate lookup route kept for older frontends.
pub const PROXY_STATUS_ROUTE: &str = "/api/proxy/firearm-status";

/// Browsers may reuse a successful lookup for this long.
const SUCCESS_CACHE_CONTROL: &str = "private, max-age=300";

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Shared application state injected into every route handler via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    /// Only mutable state in the process: per-client and daily counters.
    pub rate_limiter: Arc<RateLimiter>,
    pub client_ip_header: HeaderName,
}

impl AppState {
    pub fn new(
        upstream: UpstreamClient,
        rate_limiter: Arc<RateLimiter>,
        client_ip_header: HeaderName,
    ) -> Self {
        Self {
            upstream: Arc::new(upstream),
            rate_limiter,
            client_ip_header,
        }
    }
}

// ---------------------------------------------------------------------------
// Client address extractor
// ---------------------------------------------------------------------------

/// Identifier used for rate limiting the current request.
///
/// Taken from the configured forwarded-IP header (first entry when it holds a
/// list), else the TCP peer address, else `"unknown"`.
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(resolve_client_ip(
            &parts.headers,
            &state.client_ip_header,
            peer,
        )))
    }
}

pub fn resolve_client_ip(
    headers: &HeaderMap,
    header_name: &HeaderName,
    peer: Option<SocketAddr>,
) -> String {
    let forwarded = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "meta"
)]
pub async fn health_handler() -> Json<HealthResponse> {
    debug!("Health check request received");
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/version",
    responses((status = 200, description = "Build version", body = VersionResponse)),
    tag = "meta"
)]
pub async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "firearm-status".to_string(),
        version: VERSION.to_string(),
    })
}

pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Look up an application status by relaying the enquiry form upstream.
#[utoipa::path(
    post,
    path = "/api/firearm-status",
    request_body = FirearmStatusRequest,
    responses(
        (status = 200, description = "Raw upstream page", body = FirearmStatusResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Upstream returned an error", body = ErrorResponse),
        (status = 503, description = "Upstream unreachable or timed out", body = ErrorResponse)
    ),
    tag = "status"
)]
pub async fn firearm_status_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<FirearmStatusRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let span = info_span!(
        "firearm_status",
        request_id = %Uuid::now_v7(),
        client_ip = %client_ip
    );
    lookup_status(state, client_ip, payload)
        .instrument(span)
        .await
}

/// Received → validated → rate checked → forwarded → responded.
async fn lookup_status(
    state: AppState,
    client_ip: String,
    payload: Result<Json<FirearmStatusRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "Request rejected: unreadable body");
        ApiError::InvalidInput(rejection.body_text())
    })?;

    let query = Query::try_from(&request).map_err(|e| {
        warn!(error = %e, "Request rejected: validation error");
        ApiError::InvalidInput(e.to_string())
    })?;

    debug!(
        reference = %mask_reference(&query.reference),
        serial = %describe_serial(query.serial.as_deref()),
        "Request validated"
    );

    match state.rate_limiter.check(&client_ip) {
        RateDecision::Allowed => {}
        RateDecision::ClientLimited => {
            warn!("Rate limit exceeded");
            return Err(ApiError::RateLimited);
        }
        RateDecision::DailyLimited => {
            warn!("Daily request limit reached");
            return Err(ApiError::DailyLimitReached);
        }
    }

    let html = state.upstream.fetch_status(&query).await.map_err(|e| {
        error!(
            reference = %mask_reference(&query.reference),
            error = %e,
            "Upstream lookup failed"
        );
        ApiError::from(e)
    })?;

    info!(
        reference = %mask_reference(&query.reference),
        html_bytes = html.len(),
        "Upstream lookup succeeded"
    );

    let body = FirearmStatusResponse {
        html,
        fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        query: Some(QueryEcho::from(&query)),
    };

    Ok((
        [(header::CACHE_CONTROL, SUCCESS_CACHE_CONTROL)],
        Json(body),
    )
        .into_response())
}

pub async fn not_found_handler(method: Method, uri: Uri) -> ApiError {
    warn!(%method, path = %uri.path(), "404 Not Found");
    ApiError::NotFound
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal("request handler panicked".to_string()).into_response()
}

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(title = "Firearm status proxy"),
    paths(health_handler, version_handler, firearm_status_handler),
    components(schemas(
        FirearmStatusRequest,
        FirearmStatusResponse,
        QueryEcho,
        ErrorResponse,
        HealthResponse,
        VersionResponse
    ))
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

fn cors_layer(allowed_origin: &AllowedOrigin) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    match allowed_origin {
        AllowedOrigin::Any => layer.allow_origin(AnyOrigin),
        AllowedOrigin::Exact(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => layer.allow_origin(value),
            Err(_) => {
                warn!(origin = %origin, "ALLOWED_ORIGIN is not a valid header value; CORS disabled");
                layer
            }
        },
    }
}

/// Build the Axum application router.
pub fn create_router(state: AppState, allowed_origin: &AllowedOrigin) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api-docs/openapi.json", get(openapi_handler))
        .route(STATUS_ROUTE, post(firearm_status_handler))
        .route(PROXY_STATUS_ROUTE, post(firearm_status_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limit::{RateLimitConfig, RateLimitPolicy};
    use crate::services::upstream::UpstreamConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_app(max_requests: u32) -> Router {
        // Nothing listens on the discard port, so upstream calls fail fast
        let upstream = UpstreamClient::new(UpstreamConfig {
            url: url::Url::parse("http://127.0.0.1:9/enquiry").unwrap(),
            csrf_token: "test-token".to_string(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests,
            policy: RateLimitPolicy::PerClient,
        }));
        let state = AppState::new(
            upstream,
            limiter,
            HeaderName::from_static("x-forwarded-for"),
        );
        create_router(state, &AllowedOrigin::Any)
    }

    fn status_request(body: &str, client_ip: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(STATUS_ROUTE)
            .header("content-type", "application/json")
            .header("x-forwarded-for", client_ip)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn error_message(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice::<ErrorResponse>(&body).unwrap().error
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = create_test_app(10)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_version_follows_semver_format() {
        let response = create_test_app(10)
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let version: VersionResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(version.service, "firearm-status");
        let parts: Vec<&str> = version.version.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
    }

    #[tokio::test]
    async fn test_invalid_route_returns_404_json() {
        let response = create_test_app(10)
            .oneshot(Request::builder().uri("/invalid").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_message(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_get_on_status_route_not_allowed() {
        let response = create_test_app(10)
            .oneshot(Request::builder().uri(STATUS_ROUTE).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_non_json_content_type_is_400() {
        let request = Request::builder()
            .method("POST")
            .uri(STATUS_ROUTE)
            .header("content-type", "text/plain")
            .body(Body::from("fsref=REF1"))
            .unwrap();
        let response = create_test_app(10).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "Invalid input");
    }

    #[tokio::test]
    async fn test_missing_fsref_is_400() {
        let response = create_test_app(10)
            .oneshot(status_request(r#"{"fserial":"S1"}"#, "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blank_fsref_is_400() {
        let response = create_test_app(10)
            .oneshot(status_request(r#"{"fsref":"   "}"#, "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "Invalid input");
    }

    #[tokio::test]
    async fn test_overlong_serial_is_400() {
        let body = format!(r#"{{"fsref":"REF1","fserial":"{}"}}"#, "S".repeat(41));
        let response = create_test_app(10)
            .oneshot(status_request(&body, "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_503_without_detail() {
        let response = create_test_app(10)
            .oneshot(status_request(r#"{"fsref":"REF1"}"#, "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            error_message(response).await,
            "Failed to query upstream service"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_client() {
        let app = create_test_app(1);

        let first = app
            .clone()
            .oneshot(status_request(r#"{"fsref":"REF1"}"#, "10.0.0.1"))
            .await
            .unwrap();
        assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

        let second = app
            .clone()
            .oneshot(status_request(r#"{"fsref":"REF1"}"#, "10.0.0.1, 172.16.0.1"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error_message(second).await, "Rate limit exceeded");

        let other_client = app
            .oneshot(status_request(r#"{"fsref":"REF1"}"#, "10.0.0.2"))
            .await
            .unwrap();
        assert_ne!(other_client.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_invalid_requests_do_not_consume_quota() {
        let app = create_test_app(1);

        let invalid = app
            .clone()
            .oneshot(status_request(r#"{"fsref":""}"#, "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let valid = app
            .oneshot(status_request(r#"{"fsref":"REF1"}"#, "10.0.0.1"))
            .await
            .unwrap();
        assert_ne!(valid.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_openapi_lists_status_route() {
        let response = create_test_app(10)
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"].get(STATUS_ROUTE).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_requests_succeed() {
        let app = create_test_app(10);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let app_clone = app.clone();
                tokio::spawn(async move {
                    let response = app_clone
                        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                        .await
                        .unwrap();
                    response.status()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }
    }

    #[test]
    fn test_client_ip_uses_first_forwarded_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        let header = HeaderName::from_static("x-forwarded-for");
        assert_eq!(resolve_client_ip(&headers, &header, None), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let header = HeaderName::from_static("x-forwarded-for");
        let peer: SocketAddr = "192.0.2.10:5555".parse().unwrap();

        assert_eq!(resolve_client_ip(&headers, &header, Some(peer)), "192.0.2.10");
        assert_eq!(resolve_client_ip(&headers, &header, None), "unknown");
    }

    #[test]
    fn test_client_ip_honours_custom_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.4"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        let header = HeaderName::from_static("cf-connecting-ip");
        assert_eq!(resolve_client_ip(&headers, &header, None), "198.51.100.4");
    }
}
