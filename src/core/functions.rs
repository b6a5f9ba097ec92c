//! The portal's serverless functions, independent of the runtime hosting them.
//!
//! Each function takes a [`FunctionRequest`] and always produces a
//! [`FunctionResponse`]; failures become `{"error": "..."}` bodies with the
//! status code of the underlying [`PortalError`]. The axum dev server and the
//! lambda entry point only translate to and from these two types.

use crate::adapters::{CacheStorage, MemoryStore, RestStore};
use crate::config::portal::{PortalConfig, StoreKind};
use crate::core::cache::TtlCache;
use crate::core::dashboard::DashboardStats;
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use crate::core::repository::PortalRepository;
use crate::core::webhook::{header, PaymentNotice, WebhookVerifier};
use crate::domain::ports::{Clock, RecordStore, SystemClock};
use crate::utils::error::{ErrorCategory, PortalError, Result};
use crate::utils::validation::validate_required_field;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalFunction {
    MarkInvoicePaid,
    PublicConfig,
    PaymentWebhook,
    DashboardStats,
    MarkOverdue,
}

impl PortalFunction {
    pub const ALL: [PortalFunction; 5] = [
        PortalFunction::MarkInvoicePaid,
        PortalFunction::PublicConfig,
        PortalFunction::PaymentWebhook,
        PortalFunction::DashboardStats,
        PortalFunction::MarkOverdue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PortalFunction::MarkInvoicePaid => "mark-invoice-paid",
            PortalFunction::PublicConfig => "public-config",
            PortalFunction::PaymentWebhook => "payment-webhook",
            PortalFunction::DashboardStats => "dashboard-stats",
            PortalFunction::MarkOverdue => "mark-overdue",
        }
    }

    fn allowed_methods(&self) -> &'static [&'static str] {
        match self {
            PortalFunction::PublicConfig | PortalFunction::DashboardStats => &["GET", "POST"],
            _ => &["POST"],
        }
    }
}

impl fmt::Display for PortalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PortalFunction {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        PortalFunction::ALL
            .into_iter()
            .find(|f| f.name() == s.trim())
            .ok_or_else(|| PortalError::ConfigError {
                message: format!("unknown function: {}", s),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRequest {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FunctionRequest {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = body.to_string().into_bytes();
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    /// Empty bodies read as `null`.
    pub fn json_body(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| PortalError::malformed(format!("invalid JSON body: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl FunctionResponse {
    pub fn ok(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            headers: BTreeMap::new(),
            body: Value::Null,
        }
    }

    pub fn error(err: &PortalError) -> Self {
        Self::with_status(err.status_code(), json!({ "error": err.to_string() }))
    }

    pub fn body_string(&self) -> String {
        if self.body.is_null() && self.status == 204 {
            String::new()
        } else {
            self.body.to_string()
        }
    }
}

/// Everything a function invocation needs; cheap to clone.
#[derive(Clone)]
pub struct FunctionContext {
    config: Arc<PortalConfig>,
    repo: PortalRepository,
    reconciler: Reconciler,
    verifier: WebhookVerifier,
    cache: TtlCache<CacheStorage>,
    // bumped on every invalidation, shared by clones
    dashboard_generation: Arc<AtomicU64>,
}

impl FunctionContext {
    pub fn new(config: PortalConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: PortalConfig,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let repo = PortalRepository::with_clock(store, clock.clone());
        let cache = TtlCache::with_clock(
            CacheStorage::from_dir(config.cache.dir.as_deref()),
            Duration::from_secs(config.cache.ttl_seconds),
            clock,
        );

        Self {
            reconciler: Reconciler::new(repo.clone()),
            verifier: WebhookVerifier::from_config(&config.webhook),
            config: Arc::new(config),
            repo,
            cache,
            dashboard_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Builds the record store named by `store.kind`.
    pub fn from_config(config: PortalConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.store.kind {
            StoreKind::Rest => {
                let url = validate_required_field("store.url", &config.store.url)?;
                let key = validate_required_field("store.service_key", &config.store.service_key)?;
                Arc::new(RestStore::with_timeout(
                    url.clone(),
                    key.expose(),
                    Duration::from_secs(config.store.timeout_seconds),
                )?)
            }
            StoreKind::Memory => {
                tracing::warn!("Using in-memory store; data is lost on exit");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn repo(&self) -> &PortalRepository {
        &self.repo
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn invoke(&self, function: PortalFunction, request: FunctionRequest) -> FunctionResponse {
        let mut response = if request.method == "OPTIONS" {
            FunctionResponse::no_content()
        } else if !function.allowed_methods().contains(&request.method.as_str()) {
            FunctionResponse::error(&PortalError::MethodNotAllowed {
                method: request.method.clone(),
            })
        } else {
            let result = match function {
                PortalFunction::MarkInvoicePaid => self.mark_invoice_paid(&request).await,
                PortalFunction::PublicConfig => Ok(self.public_config()),
                PortalFunction::PaymentWebhook => self.payment_webhook(&request).await,
                PortalFunction::DashboardStats => self.dashboard_stats(&request).await,
                PortalFunction::MarkOverdue => self.mark_overdue(&request).await,
            };

            match result {
                Ok(response) => response,
                Err(e) => {
                    if matches!(
                        e.category(),
                        ErrorCategory::Upstream | ErrorCategory::Configuration | ErrorCategory::System
                    ) {
                        tracing::error!("❌ {} failed: {} ({:?})", function, e, e.category());
                    } else {
                        tracing::warn!("{} rejected: {}", function, e);
                    }
                    FunctionResponse::error(&e)
                }
            }
        };

        self.apply_cors(&request, &mut response);
        response
    }

    fn apply_cors(&self, request: &FunctionRequest, response: &mut FunctionResponse) {
        let origins = &self.config.server.allowed_origins;
        let allow_origin = if origins.iter().any(|o| o == "*") {
            Some("*".to_string())
        } else {
            request
                .header("origin")
                .filter(|origin| origins.iter().any(|o| o.as_str() == *origin))
                .map(str::to_string)
        };

        if let Some(origin) = allow_origin {
            response
                .headers
                .insert("access-control-allow-origin".to_string(), origin);
            response.headers.insert(
                "access-control-allow-headers".to_string(),
                format!(
                    "authorization, content-type, apikey, x-client-info, {}, {}",
                    self.config.webhook.secret_header, self.config.webhook.signature_header
                ),
            );
            response.headers.insert(
                "access-control-allow-methods".to_string(),
                "GET, POST, OPTIONS".to_string(),
            );
        }
    }

    fn require_service_token(&self, request: &FunctionRequest) -> Result<()> {
        self.check_service_token(request.header("authorization"))
    }

    /// Accepts anything when no service token is configured.
    pub fn check_service_token(&self, authorization: Option<&str>) -> Result<()> {
        let Some(expected) = &self.config.functions.service_token else {
            return Ok(());
        };

        let presented = authorization
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
            .ok_or_else(|| PortalError::unauthorized("missing bearer token"))?;

        if bool::from(presented.trim().as_bytes().ct_eq(expected.expose().as_bytes())) {
            Ok(())
        } else {
            Err(PortalError::unauthorized("invalid bearer token"))
        }
    }

    /// Drops the cached dashboards that include `company_id`.
    ///
    /// Runs after a write has committed, so a cache failure is logged and the
    /// stale entry lives until its TTL instead of failing the request.
    pub async fn invalidate_dashboard(&self, company_id: &str) {
        self.dashboard_generation.fetch_add(1, Ordering::SeqCst);
        for key in [dashboard_key(None), dashboard_key(Some(company_id))] {
            if let Err(e) = self.cache.remove(&key).await {
                tracing::warn!("Could not drop cached {}: {}", key, e);
            }
        }
    }

    async fn mark_invoice_paid(&self, request: &FunctionRequest) -> Result<FunctionResponse> {
        self.require_service_token(request)?;

        let body = request.json_body()?;
        let invoice_id = ["invoice_id", "invoiceId", "id"]
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(|value| match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| PortalError::malformed("invoice_id is required"))?;
        let reference = body.get("payment_reference").and_then(Value::as_str);

        tracing::info!("Marking invoice {} as paid", invoice_id);
        let (outcome, invoice) = self.reconciler.mark_paid(&invoice_id, reference).await?;
        self.invalidate_dashboard(&invoice.company_id).await;

        Ok(FunctionResponse::ok(json!({
            "outcome": outcome,
            "invoice": invoice,
        })))
    }

    fn public_config(&self) -> FunctionResponse {
        let public = &self.config.public;
        FunctionResponse::ok(json!({
            "app_name": public.app_name,
            "support_email": public.support_email,
            "currency": public.currency,
            "store_url": self.config.store.url,
            "store_anon_key": self.config.store.anon_key,
            "payment_publishable_key": public.payment_publishable_key,
        }))
    }

    async fn payment_webhook(&self, request: &FunctionRequest) -> Result<FunctionResponse> {
        let verification =
            self.verifier
                .verify(&request.headers, &request.body, self.repo.clock().now())?;
        tracing::debug!("Webhook verified via {:?}", verification);

        let payload = request.json_body()?;
        let notice = PaymentNotice::from_payload(&payload)?;
        tracing::info!(
            "Webhook for invoice {}: {} (event {:?})",
            notice.invoice_id,
            notice.provider_status,
            notice.event_id
        );

        let report = self.reconciler.apply(&notice).await?;
        if report.outcome == ReconcileOutcome::Applied {
            match self.repo.get_invoice(&notice.invoice_id).await {
                Ok(invoice) => self.invalidate_dashboard(&invoice.company_id).await,
                Err(e) => tracing::warn!(
                    "Invoice {} updated but not re-read for cache invalidation: {}",
                    notice.invoice_id,
                    e
                ),
            }
        }

        Ok(FunctionResponse::ok(json!({
            "received": true,
            "outcome": report.outcome,
            "invoice_id": report.invoice_id,
            "status": report.status,
        })))
    }

    async fn dashboard_stats(&self, request: &FunctionRequest) -> Result<FunctionResponse> {
        self.require_service_token(request)?;

        let body = request.json_body()?;
        let company_id = request
            .query
            .get("company_id")
            .cloned()
            .or_else(|| match body.get("company_id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .filter(|id| !id.trim().is_empty());

        let key = dashboard_key(company_id.as_deref());
        if let Some(stats) = self.cache.get::<DashboardStats>(&key).await? {
            return Ok(FunctionResponse::ok(serde_json::to_value(stats)?));
        }

        let generation = self.dashboard_generation.load(Ordering::SeqCst);
        let stats = DashboardStats::compute(&self.repo, company_id.as_deref()).await?;
        // an invalidation while computing means `stats` may predate that write
        if self.dashboard_generation.load(Ordering::SeqCst) == generation {
            self.cache.set(&key, &stats).await?;
        } else {
            tracing::debug!("Portal data changed while computing {}; not caching", key);
        }

        Ok(FunctionResponse::ok(serde_json::to_value(stats)?))
    }

    async fn mark_overdue(&self, request: &FunctionRequest) -> Result<FunctionResponse> {
        self.require_service_token(request)?;

        let today = self.repo.clock().now().date_naive();
        let moved = self.reconciler.sweep_overdue(today).await?;
        for invoice in &moved {
            self.invalidate_dashboard(&invoice.company_id).await;
        }

        let ids: Vec<&str> = moved.iter().map(|i| i.id.as_str()).collect();
        Ok(FunctionResponse::ok(json!({
            "as_of": today,
            "moved": ids,
        })))
    }
}

fn dashboard_key(company_id: Option<&str>) -> String {
    format!("dashboard:{}", company_id.unwrap_or("all"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::portal::SecretString;
    use crate::core::webhook::sign_payload;
    use crate::domain::ports::{Filter, Table};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    fn config() -> PortalConfig {
        let mut config = PortalConfig::default();
        config.store.kind = StoreKind::Memory;
        config.store.url = Some("https://db.example.com".to_string());
        config.store.anon_key = Some("anon-key".to_string());
        config.store.service_key = Some(SecretString::new("service-key"));
        config.webhook.secret = Some(SecretString::new("whsec"));
        config.functions.service_token = Some(SecretString::new("svc-token"));
        config
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed(
                Table::Invoices,
                vec![json!({
                    "id": "inv-1",
                    "company_id": "c-1",
                    "number": "2024-100",
                    "amount_cents": 2500,
                    "currency": "USD",
                    "status": "pending",
                    "issued_on": "2024-05-01",
                    "due_on": "2099-05-31"
                })],
            )
            .await;
        store
    }

    async fn context() -> (MemoryStore, FunctionContext) {
        let store = seeded_store().await;
        let ctx = FunctionContext::new(config(), Arc::new(store.clone()));
        (store, ctx)
    }

    fn dashboard_request() -> FunctionRequest {
        FunctionRequest::new("GET")
            .with_header("authorization", "Bearer svc-token")
            .with_query("company_id", "c-1")
    }

    fn mark_paid_request() -> FunctionRequest {
        FunctionRequest::new("POST")
            .with_header("authorization", "Bearer svc-token")
            .with_json(&json!({"invoice_id": "inv-1"}))
    }

    /// Holds the result of the first invoice read until released.
    struct GatedStore {
        inner: MemoryStore,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>> {
            let rows = self.inner.select(table, filter).await?;
            if table == Table::Invoices && self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(rows)
        }

        async fn insert(&self, table: Table, row: Value) -> Result<Value> {
            self.inner.insert(table, row).await
        }

        async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
            self.inner.update(table, filter, patch).await
        }

        async fn delete(&self, table: Table, filter: &Filter) -> Result<usize> {
            self.inner.delete(table, filter).await
        }
    }

    #[test]
    fn test_function_names_roundtrip() {
        for function in PortalFunction::ALL {
            assert_eq!(function.name().parse::<PortalFunction>().unwrap(), function);
        }
        assert!("send-email".parse::<PortalFunction>().is_err());
    }

    #[tokio::test]
    async fn test_public_config_hides_secrets() {
        let (_, ctx) = context().await;
        let response = ctx
            .invoke(PortalFunction::PublicConfig, FunctionRequest::new("GET"))
            .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body["store_anon_key"], "anon-key");
        let text = response.body.to_string();
        assert!(!text.contains("service-key"));
        assert!(!text.contains("whsec"));
        assert!(!text.contains("svc-token"));
        assert_eq!(response.headers["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let (_, ctx) = context().await;
        let response = ctx
            .invoke(PortalFunction::PaymentWebhook, FunctionRequest::new("OPTIONS"))
            .await;
        assert_eq!(response.status, 204);
        assert!(response.headers["access-control-allow-headers"].contains("x-webhook-signature"));
        assert_eq!(response.body_string(), "");
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let (_, ctx) = context().await;
        let response = ctx
            .invoke(PortalFunction::PaymentWebhook, FunctionRequest::new("GET"))
            .await;
        assert_eq!(response.status, 405);
    }

    #[tokio::test]
    async fn test_signed_webhook_marks_invoice_paid() {
        let (store, ctx) = context().await;
        let payload = json!({
            "id": "evt_100",
            "type": "invoice.paid",
            "data": {"invoice_id": "inv-1"}
        });
        let body = payload.to_string();
        let signature = sign_payload("whsec", Utc::now().timestamp(), body.as_bytes()).unwrap();

        let response = ctx
            .invoke(
                PortalFunction::PaymentWebhook,
                FunctionRequest::new("POST")
                    .with_header("X-Webhook-Signature", &signature)
                    .with_json(&payload),
            )
            .await;

        assert_eq!(response.status, 200, "{}", response.body);
        assert_eq!(response.body["outcome"], "applied");
        assert_eq!(response.body["status"], "paid");
        assert_eq!(store.rows(Table::Invoices).await[0]["status"], "paid");
    }

    #[tokio::test]
    async fn test_webhook_with_bad_secret_is_rejected() {
        let (store, ctx) = context().await;
        let response = ctx
            .invoke(
                PortalFunction::PaymentWebhook,
                FunctionRequest::new("POST")
                    .with_header("x-webhook-secret", "guess")
                    .with_json(&json!({"invoice_id": "inv-1", "status": "paid"})),
            )
            .await;

        assert_eq!(response.status, 401);
        assert!(response.body["error"].as_str().unwrap().contains("Unauthorized"));
        assert_eq!(store.rows(Table::Invoices).await[0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_webhook_with_unparseable_body() {
        let (_, ctx) = context().await;
        let mut request = FunctionRequest::new("POST").with_header("x-webhook-secret", "whsec");
        request.body = b"{not json".to_vec();
        let response = ctx.invoke(PortalFunction::PaymentWebhook, request).await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_mark_invoice_paid_requires_token() {
        let (_, ctx) = context().await;
        let request = FunctionRequest::new("POST").with_json(&json!({"invoice_id": "inv-1"}));

        let denied = ctx
            .invoke(PortalFunction::MarkInvoicePaid, request.clone())
            .await;
        assert_eq!(denied.status, 401);

        let allowed = ctx
            .invoke(
                PortalFunction::MarkInvoicePaid,
                request.with_header("Authorization", "Bearer svc-token"),
            )
            .await;
        assert_eq!(allowed.status, 200);
        assert_eq!(allowed.body["invoice"]["status"], "paid");
        assert_eq!(allowed.body["outcome"], "applied");

        for token in ["Bearer svc-toke", "Bearer svc-token-2", "Bearer "] {
            let response = ctx
                .invoke(
                    PortalFunction::MarkInvoicePaid,
                    FunctionRequest::new("POST")
                        .with_header("authorization", token)
                        .with_json(&json!({"invoice_id": "inv-1"})),
                )
                .await;
            assert_eq!(response.status, 401, "{}", token);
        }
    }

    #[tokio::test]
    async fn test_mark_invoice_paid_missing_id() {
        let (_, ctx) = context().await;
        let response = ctx
            .invoke(
                PortalFunction::MarkInvoicePaid,
                FunctionRequest::new("POST")
                    .with_header("authorization", "Bearer svc-token")
                    .with_json(&json!({"reference": "x"})),
            )
            .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_dashboard_is_cached_until_invoice_changes() {
        let (_, ctx) = context().await;
        let dashboard = || {
            FunctionRequest::new("GET")
                .with_header("authorization", "Bearer svc-token")
                .with_query("company_id", "c-1")
        };

        let first = ctx.invoke(PortalFunction::DashboardStats, dashboard()).await;
        assert_eq!(first.status, 200);
        assert_eq!(first.body["outstanding_cents"], 2500);

        ctx.invoke(
            PortalFunction::MarkInvoicePaid,
            FunctionRequest::new("POST")
                .with_header("authorization", "Bearer svc-token")
                .with_json(&json!({"invoiceId": "inv-1"})),
        )
        .await;

        let second = ctx.invoke(PortalFunction::DashboardStats, dashboard()).await;
        assert_eq!(second.body["outstanding_cents"], 0);
        assert_eq!(second.body["paid_cents"], 2500);
    }

    #[tokio::test]
    async fn test_webhook_matches_integer_invoice_ids() {
        let store = MemoryStore::new();
        store
            .seed(
                Table::Invoices,
                vec![json!({
                    "id": 1042,
                    "company_id": 7,
                    "number": "2024-101",
                    "amount_cents": 800,
                    "currency": "USD",
                    "status": "pending",
                    "issued_on": "2024-05-01",
                    "due_on": "2099-05-31"
                })],
            )
            .await;
        let ctx = FunctionContext::new(config(), Arc::new(store.clone()));

        let response = ctx
            .invoke(
                PortalFunction::PaymentWebhook,
                FunctionRequest::new("POST")
                    .with_header("x-webhook-secret", "whsec")
                    .with_json(&json!({"external_reference": 1042, "status": "paid"})),
            )
            .await;

        assert_eq!(response.status, 200, "{}", response.body);
        assert_eq!(response.body["outcome"], "applied");
        assert_eq!(response.body["invoice_id"], "1042");
        assert_eq!(store.rows(Table::Invoices).await[0]["status"], "paid");
    }

    #[tokio::test]
    async fn test_broken_cache_does_not_fail_committed_payment() {
        let not_a_dir = tempfile::NamedTempFile::new().unwrap();
        let mut config = config();
        config.cache.dir = Some(not_a_dir.path().to_str().unwrap().to_string());
        let store = seeded_store().await;
        let ctx = FunctionContext::new(config, Arc::new(store.clone()));

        let webhook = ctx
            .invoke(
                PortalFunction::PaymentWebhook,
                FunctionRequest::new("POST")
                    .with_header("x-webhook-secret", "whsec")
                    .with_json(&json!({"invoice_id": "inv-1", "status": "paid"})),
            )
            .await;
        assert_eq!(webhook.status, 200, "{}", webhook.body);
        assert_eq!(webhook.body["outcome"], "applied");
        assert_eq!(store.rows(Table::Invoices).await[0]["status"], "paid");

        let manual = ctx.invoke(PortalFunction::MarkInvoicePaid, mark_paid_request()).await;
        assert_eq!(manual.status, 200, "{}", manual.body);
        assert_eq!(manual.body["outcome"], "already_applied");
    }

    #[tokio::test]
    async fn test_dashboard_computed_across_a_payment_is_not_cached() {
        let gate = Arc::new(GatedStore {
            inner: seeded_store().await,
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let ctx = FunctionContext::new(config(), gate.clone());

        let in_flight = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                ctx.invoke(PortalFunction::DashboardStats, dashboard_request())
                    .await
            }
        });
        gate.entered.notified().await;

        let paid = ctx.invoke(PortalFunction::MarkInvoicePaid, mark_paid_request()).await;
        assert_eq!(paid.status, 200, "{}", paid.body);

        gate.release.notify_one();
        let stale = in_flight.await.unwrap();
        assert_eq!(stale.status, 200);
        assert_eq!(stale.body["outstanding_cents"], 2500);

        let fresh = ctx.invoke(PortalFunction::DashboardStats, dashboard_request()).await;
        assert_eq!(fresh.body["outstanding_cents"], 0);
        assert_eq!(fresh.body["paid_cents"], 2500);
    }

    #[tokio::test]
    async fn test_mark_overdue_with_nothing_due() {
        let (_, ctx) = context().await;
        let response = ctx
            .invoke(
                PortalFunction::MarkOverdue,
                FunctionRequest::new("POST").with_header("authorization", "Bearer svc-token"),
            )
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["moved"], json!([]));
    }
}
