pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod marking;
pub mod metrics;
pub mod middleware;
pub mod ports;
pub mod robokassa;
pub mod schemas;
pub mod services;
pub mod startup;
pub mod telemetry;
pub mod use_cases;

use crate::health::HealthChecker;
use crate::marking::CodeIssuer;
use crate::metrics::Metrics;
use crate::middleware::RateLimiter;
use crate::ports::{CodeRequestRepository, OrderRepository, PaymentRepository, UserRepository};
use crate::robokassa::RobokassaGateway;
use crate::services::{ArtifactStore, PricingSource};
use crate::use_cases::{
    CodeFulfilment, CreatePayment, HandlePaymentCallback, RegisterUser, RequestCodes, RetryPolicy,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Everything the application is assembled from. Production wiring lives in
/// [`startup`]; tests pass in-memory repositories and a stub issuer.
#[derive(Clone)]
pub struct Dependencies {
    pub users: Arc<dyn UserRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub code_requests: Arc<dyn CodeRequestRepository>,
    pub issuer: Arc<dyn CodeIssuer>,
    pub pricing: Arc<dyn PricingSource>,
    pub gateway: RobokassaGateway,
    pub artifacts: ArtifactStore,
    pub metrics: Metrics,
    pub health_checker: Arc<HealthChecker>,
    pub retry_policy: RetryPolicy,
    pub currency: String,
    pub rate_limiter: RateLimiter,
    pub cors_allowed_origins: Option<String>,
}

impl Dependencies {
    pub fn fulfilment(&self) -> CodeFulfilment {
        CodeFulfilment::new(
            self.code_requests.clone(),
            self.issuer.clone(),
            self.artifacts.clone(),
            self.metrics.clone(),
            self.retry_policy,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub code_requests: Arc<dyn CodeRequestRepository>,
    pub register_user: Arc<RegisterUser>,
    pub request_codes: Arc<RequestCodes>,
    pub create_payment: Arc<CreatePayment>,
    pub payment_callback: Arc<HandlePaymentCallback>,
    pub artifacts: ArtifactStore,
    pub metrics: Metrics,
    pub health_checker: Arc<HealthChecker>,
    pub rate_limiter: RateLimiter,
    pub cors_allowed_origins: Option<String>,
}

impl AppState {
    pub fn new(deps: Dependencies) -> Self {
        let register_user = RegisterUser::new(deps.users.clone(), deps.metrics.clone());
        let request_codes = RequestCodes::new(
            deps.users.clone(),
            deps.orders.clone(),
            deps.pricing.clone(),
            deps.fulfilment(),
            deps.retry_policy,
            deps.metrics.clone(),
        );
        let create_payment = CreatePayment::new(
            deps.users.clone(),
            deps.orders.clone(),
            deps.payments.clone(),
            deps.gateway.clone(),
            deps.currency.clone(),
            deps.metrics.clone(),
        );
        let payment_callback =
            HandlePaymentCallback::new(deps.payments.clone(), deps.gateway, deps.metrics.clone());

        Self {
            users: deps.users,
            payments: deps.payments,
            code_requests: deps.code_requests,
            register_user: Arc::new(register_user),
            request_codes: Arc::new(request_codes),
            create_payment: Arc::new(create_payment),
            payment_callback: Arc::new(payment_callback),
            artifacts: deps.artifacts,
            metrics: deps.metrics,
            health_checker: deps.health_checker,
            rate_limiter: deps.rate_limiter,
            cors_allowed_origins: deps.cors_allowed_origins,
        }
    }
}

pub fn create_app(app_state: AppState) -> Router {
    let cors = cors_layer(app_state.cors_allowed_origins.as_deref());
    let artifacts = ServeDir::new(app_state.artifacts.dir());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/users/register", post(handlers::users::register))
        .route("/api/users", get(handlers::users::get_user))
        .route("/api/kizs", post(handlers::codes::request_codes))
        .route("/api/orders", post(handlers::codes::request_codes))
        .route("/api/requests", get(handlers::requests::list_requests))
        .route("/api/requests/status", get(handlers::requests::request_status))
        .route("/api/payments/create", post(handlers::payments::create_payment))
        .route("/api/payments", post(handlers::payments::create_payment))
        .route(
            "/api/payments/callback",
            get(handlers::payments::callback_query).post(handlers::payments::callback_form),
        )
        .route("/api/payments/status", get(handlers::payments::payment_status))
        .nest_service("/api/artifacts", artifacts)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            app_state.rate_limiter.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::request_logger_middleware))
        .layer(cors)
        .with_state(app_state)
}

/// Comma-separated origins, or any origin when unset or `*`.
fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::auth::API_KEY_HEADER),
        ]);

    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or("*")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty() && *origin != "*")
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
