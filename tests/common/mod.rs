#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use kiz_gateway::config::{RobokassaConfig, Secret};
use kiz_gateway::domain::{
    CodeRequest, CodeRequestPayload, CodeRequestStatus, NewCodeRequest, NewPayment, Order,
    OrderDraft, OrderItem, OrderStatus, Payment, PaymentStatus, Registration, User,
};
use kiz_gateway::health::HealthChecker;
use kiz_gateway::marking::{CodeIssuer, CodeIssuerError};
use kiz_gateway::metrics::Metrics;
use kiz_gateway::middleware::RateLimiter;
use kiz_gateway::ports::{
    CodeRequestRepository, CreatedOrder, OrderRepository, PaymentRepository, RepositoryError,
    UpsertedUser, UserRepository,
};
use kiz_gateway::robokassa::{HashAlgorithm, RobokassaGateway};
use kiz_gateway::services::{ArtifactStore, FixedPricing};
use kiz_gateway::use_cases::RetryPolicy;
use kiz_gateway::{create_app, AppState, Dependencies};
use serde_json::Value;
use sqlx::types::Json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const MERCHANT_LOGIN: &str = "demo-shop";
pub const PASSWORD: &str = "password-one";
pub const RESULT_PASSWORD: &str = "password-two";

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    payments: Vec<Payment>,
    code_requests: Vec<CodeRequest>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Repository ports over plain vectors, with the schema's status rules
/// applied the way the Postgres triggers apply them.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn orders(&self) -> Vec<Order> {
        self.tables.lock().unwrap().orders.clone()
    }

    pub fn order(&self, id: i64) -> Option<Order> {
        self.tables.lock().unwrap().orders.iter().find(|o| o.id == id).cloned()
    }

    pub fn payment(&self, id: i64) -> Option<Payment> {
        self.tables.lock().unwrap().payments.iter().find(|p| p.id == id).cloned()
    }

    pub fn code_request(&self, id: i64) -> Option<CodeRequest> {
        self.tables
            .lock()
            .unwrap()
            .code_requests
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn items_count(&self) -> usize {
        self.tables.lock().unwrap().items.len()
    }

    pub fn set_payment_status(&self, id: i64, status: PaymentStatus) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(p) = tables.payments.iter_mut().find(|p| p.id == id) {
            p.status = status;
        }
    }

    /// Makes a pending request due right away.
    pub fn make_due(&self, id: i64) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(r) = tables.code_requests.iter_mut().find(|r| r.id == id) {
            r.next_attempt_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::hours(1))
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn upsert(
        &self,
        registration: &Registration,
        api_key: &str,
    ) -> Result<UpsertedUser, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();

        if let Some(user) = tables
            .users
            .iter_mut()
            .find(|u| u.telegram_id == registration.telegram_id)
        {
            user.inn = registration.inn.clone();
            user.email = registration.email.clone();
            user.first_name = registration.first_name.clone();
            user.last_name = registration.last_name.clone();
            user.middle_name = registration.middle_name.clone();
            user.username = registration.username.clone();
            user.api_key = api_key.to_string();
            user.last_active = now;
            return Ok(UpsertedUser {
                user: user.clone(),
                created: false,
            });
        }

        let user = User {
            id: tables.id(),
            telegram_id: registration.telegram_id,
            inn: registration.inn.clone(),
            email: registration.email.clone(),
            first_name: registration.first_name.clone(),
            last_name: registration.last_name.clone(),
            middle_name: registration.middle_name.clone(),
            username: registration.username.clone(),
            api_key: api_key.to_string(),
            registered_at: now,
            last_active: now,
        };
        tables.users.push(user.clone());
        Ok(UpsertedUser { user, created: true })
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.telegram_id == telegram_id).cloned())
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.api_key == api_key).cloned())
    }

    async fn touch(&self, user_id: i64) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.last_active = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_with_code_request(
        &self,
        draft: &OrderDraft,
        request: &NewCodeRequest,
        first_retry_in: Duration,
    ) -> Result<CreatedOrder, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();

        // CHECK constraints reject the whole transaction
        if draft.items.iter().any(|i| i.quantity <= 0) {
            return Err(RepositoryError::Validation(
                "order_items_quantity_check".to_string(),
            ));
        }

        let now = Utc::now();
        let order = Order {
            id: tables.id(),
            user_id: draft.user_id,
            total_amount: draft.total_amount.clone(),
            status: draft.status(),
            payment_reference: None,
            created_at: now,
            updated_at: now,
        };

        let mut items = Vec::new();
        for item in &draft.items {
            items.push(OrderItem {
                id: tables.id(),
                order_id: order.id,
                gtin: item.gtin.to_string(),
                quantity: item.quantity,
                unit_price: item.unit_price.clone(),
            });
        }

        let code_request = CodeRequest {
            id: tables.id(),
            order_id: order.id,
            user_id: draft.user_id,
            telegram_id: request.telegram_id,
            inn: request.payload.inn.clone(),
            request_data: Json(request.payload.clone()),
            status: CodeRequestStatus::Pending,
            codes: Json(Vec::new()),
            artifact_path: None,
            attempts: 1,
            last_error: None,
            next_attempt_at: now + to_chrono(first_retry_in),
            created_at: now,
            updated_at: now,
        };

        tables.orders.push(order.clone());
        tables.items.extend(items.clone());
        tables.code_requests.push(code_request.clone());

        Ok(CreatedOrder {
            order,
            items,
            code_request,
        })
    }

    async fn find(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        Ok(self.order(order_id))
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_for_order(&self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.id();

        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == payment.order_id)
            .ok_or_else(|| RepositoryError::Validation("payments_order_id_fkey".to_string()))?;
        if !order.status.is_payable() {
            return Err(RepositoryError::Conflict(format!(
                "order {} is no longer payable",
                order.id
            )));
        }
        order.status = OrderStatus::Pending;
        order.payment_reference = Some(id.to_string());
        order.updated_at = Utc::now();

        let row = Payment {
            id,
            order_id: payment.order_id,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            status: PaymentStatus::Pending,
            transaction_id: payment.transaction_id,
            gateway_reference: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        tables.payments.push(row.clone());
        Ok(row)
    }

    async fn find(&self, payment_id: i64) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.payment(payment_id))
    }

    async fn find_for_telegram_user(
        &self,
        payment_id: i64,
        telegram_id: i64,
    ) -> Result<Option<Payment>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        let Some(payment) = tables.payments.iter().find(|p| p.id == payment_id) else {
            return Ok(None);
        };
        let owned = tables
            .orders
            .iter()
            .find(|o| o.id == payment.order_id)
            .and_then(|o| tables.users.iter().find(|u| u.id == o.user_id))
            .map(|u| u.telegram_id == telegram_id)
            .unwrap_or(false);
        Ok(owned.then(|| payment.clone()))
    }

    async fn complete_if_pending(
        &self,
        payment_id: i64,
        gateway_reference: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(payment) = tables
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id && p.status == PaymentStatus::Pending)
        else {
            return Ok(false);
        };
        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(Utc::now());
        if let Some(reference) = gateway_reference {
            payment.gateway_reference = Some(reference.to_string());
        }
        let order_id = payment.order_id;

        if let Some(order) = tables
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && o.status == OrderStatus::Pending)
        {
            order.status = OrderStatus::Paid;
        }
        Ok(true)
    }
}

#[async_trait]
impl CodeRequestRepository for InMemoryStore {
    async fn find(&self, id: i64) -> Result<Option<CodeRequest>, RepositoryError> {
        Ok(self.code_request(id))
    }

    async fn list_for_telegram_id(
        &self,
        telegram_id: i64,
        limit: i64,
    ) -> Result<Vec<CodeRequest>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        let mut requests: Vec<CodeRequest> = tables
            .code_requests
            .iter()
            .filter(|r| r.telegram_id == telegram_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        requests.truncate(limit.max(0) as usize);
        Ok(requests)
    }

    async fn mark_completed(
        &self,
        id: i64,
        codes: &[String],
        artifact_path: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.update(id, |r| {
            r.status = CodeRequestStatus::Completed;
            r.codes = Json(codes.to_vec());
            r.artifact_path = artifact_path.map(str::to_string);
            r.last_error = None;
        })
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        partial_codes: &[String],
    ) -> Result<(), RepositoryError> {
        self.update(id, |r| {
            r.status = CodeRequestStatus::Failed;
            r.codes = Json(partial_codes.to_vec());
            r.last_error = Some(error.to_string());
        })
    }

    async fn reschedule(
        &self,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), RepositoryError> {
        self.update(id, |r| {
            r.last_error = Some(error.to_string());
            r.next_attempt_at = Utc::now() + to_chrono(retry_in);
        })
    }

    async fn claim_due(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<CodeRequest>, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        let mut claimed = Vec::new();
        for request in tables.code_requests.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if request.status == CodeRequestStatus::Pending && request.next_attempt_at <= now {
                request.attempts += 1;
                request.next_attempt_at = now + to_chrono(lease);
                request.updated_at = now;
                claimed.push(request.clone());
            }
        }
        Ok(claimed)
    }
}

impl InMemoryStore {
    fn update(&self, id: i64, apply: impl FnOnce(&mut CodeRequest)) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let request = tables
            .code_requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("code request {}", id)))?;
        apply(request);
        request.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum IssuerBehaviour {
    /// One code per requested unit.
    Issue,
    Unavailable,
    Rejected,
}

/// Scripted marking API.
pub struct StubIssuer {
    behaviour: Mutex<IssuerBehaviour>,
    calls: AtomicUsize,
}

impl StubIssuer {
    pub fn new(behaviour: IssuerBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Mutex::new(behaviour),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, behaviour: IssuerBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeIssuer for StubIssuer {
    async fn issue(&self, payload: &CodeRequestPayload) -> Result<Vec<String>, CodeIssuerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.lock().unwrap().clone();
        match behaviour {
            IssuerBehaviour::Issue => Ok(payload
                .gtin_data
                .iter()
                .flat_map(|line| {
                    (0..line.count).map(move |n| format!("01{}21SERIAL{:04}", line.gtin, n))
                })
                .collect()),
            IssuerBehaviour::Unavailable => {
                Err(CodeIssuerError::Unavailable("connection refused".to_string()))
            }
            IssuerBehaviour::Rejected => Err(CodeIssuerError::Rejected {
                status: 422,
                message: "unknown gtin".to_string(),
                partial: vec!["0104602380040001215PARTIAL".to_string()],
            }),
        }
    }
}

pub fn robokassa_config() -> RobokassaConfig {
    RobokassaConfig {
        merchant_login: MERCHANT_LOGIN.to_string(),
        password: Secret::new(PASSWORD),
        result_password: Some(Secret::new(RESULT_PASSWORD)),
        base_url: "https://auth.robokassa.ru/Merchant/Index.aspx".to_string(),
        hash: HashAlgorithm::Sha256,
        test_mode: true,
        currency: "RUB".to_string(),
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_secs(30),
        lease: Duration::from_secs(60),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub issuer: Arc<StubIssuer>,
    pub deps: Dependencies,
    pub artifact_dir: TempDir,
}

pub fn dependencies(
    store: Arc<InMemoryStore>,
    issuer: Arc<StubIssuer>,
    artifact_dir: &TempDir,
    rate_limiter: RateLimiter,
) -> Dependencies {
    Dependencies {
        users: store.clone(),
        orders: store.clone(),
        payments: store.clone(),
        code_requests: store,
        issuer,
        pricing: Arc::new(FixedPricing::new("100.00".parse().unwrap())),
        gateway: RobokassaGateway::new(&robokassa_config()).unwrap(),
        artifacts: ArtifactStore::new(artifact_dir.path()),
        metrics: Metrics::new().unwrap(),
        health_checker: Arc::new(HealthChecker::new()),
        retry_policy: retry_policy(),
        currency: "RUB".to_string(),
        rate_limiter,
        cors_allowed_origins: None,
    }
}

pub fn test_app(behaviour: IssuerBehaviour) -> TestApp {
    test_app_with_limiter(behaviour, RateLimiter::new(1000, 1000))
}

pub fn test_app_with_limiter(behaviour: IssuerBehaviour, rate_limiter: RateLimiter) -> TestApp {
    let store = InMemoryStore::new();
    let issuer = StubIssuer::new(behaviour);
    let artifact_dir = tempfile::tempdir().unwrap();
    let deps = dependencies(store.clone(), issuer.clone(), &artifact_dir, rate_limiter);
    let router = create_app(AppState::new(deps.clone()));

    TestApp {
        router,
        store,
        issuer,
        deps,
        artifact_dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        TestResponse {
            status,
            body: body.to_vec(),
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value, api_key: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, api_key: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Registers a user and returns its API key.
    pub async fn register(&self, telegram_id: i64, inn: &str) -> String {
        let response = self
            .post_json(
                "/api/users/register",
                serde_json::json!({"telegram_id": telegram_id, "inn": inn}),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.json()["api_key"].as_str().unwrap().to_string()
    }
}

/// Signature the gateway would send to ResultURL.
pub fn callback_signature(out_sum: &str, inv_id: &str) -> String {
    kiz_gateway::robokassa::compute_signature(
        &[out_sum, inv_id, RESULT_PASSWORD],
        HashAlgorithm::Sha256,
    )
}
