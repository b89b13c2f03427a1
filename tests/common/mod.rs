#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use solestore::config::{AdminSeed, AuthSettings, StoreSettings};
use solestore::services::events::RecordingPublisher;
use solestore::services::PaymentGateway;
use solestore::store::MemoryStore;
use solestore::{api, AppState};

pub const PAYMENT_SECRET: &str = "test-gateway-secret";
pub const ADMIN_EMAIL: &str = "admin@solestore.test";
pub const ADMIN_PASSWORD: &str = "admin-password-1";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingPublisher>,
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(RecordingPublisher::default());
    let auth = AuthSettings { jwt_secret: "integration-test-secret".into(), token_ttl: chrono::Duration::hours(1) };
    let state = AppState::new(store.clone(), events.clone(), auth, StoreSettings::default(), PAYMENT_SECRET);
    state.auth
        .seed_admin(&AdminSeed { email: ADMIN_EMAIL.into(), password: ADMIN_PASSWORD.into() })
        .await
        .unwrap();
    TestApp { router: api::router(state.clone()), state, store, events }
}

impl TestApp {
    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.request_with(method, uri, token, body, &[]).await
    }

    pub async fn request_with(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self
            .request("POST", "/api/v1/auth/login", None, Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Registers a customer with a default address and returns their token.
    pub async fn customer_token(&self, email: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({ "name": "Test Shopper", "email": email, "password": "shopper-pass-1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let token = body["token"].as_str().unwrap().to_string();
        let (status, _) = self.request("PUT", "/api/v1/account", Some(&token), Some(json!({ "default_address": address() }))).await;
        assert_eq!(status, StatusCode::OK);
        token
    }

    /// Creates an active product through the admin API and returns its id.
    pub async fn create_product(&self, admin: &str, sku: &str, price: u32, sizes: &[(&str, u32)]) -> String {
        let sizes: Vec<Value> = sizes.iter().map(|(size, stock)| json!({ "size": size, "stock": stock })).collect();
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/admin/products",
                Some(admin),
                Some(json!({
                    "sku": sku,
                    "name": format!("Runner {}", sku),
                    "brand": "Stride",
                    "category": "running",
                    "gender": "unisex",
                    "price": price,
                    "images": ["https://cdn.example.com/image/upload/runner.jpg"],
                    "sizes": sizes,
                    "status": "active",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn stock(&self, admin: &str, product_id: &str, size: &str) -> u64 {
        let (_, body) = self.request("GET", &format!("/api/v1/admin/products/{}", product_id), Some(admin), None).await;
        body["sizes"].as_array().unwrap().iter().find(|s| s["size"] == size).unwrap()["stock"].as_u64().unwrap()
    }

    pub fn sign(&self, gateway_order_id: &str, payment_id: &str) -> String {
        PaymentGateway::new(PAYMENT_SECRET).sign(gateway_order_id, payment_id).unwrap()
    }
}

pub fn address() -> Value {
    json!({
        "full_name": "Test Shopper",
        "line1": "221 Residency Road",
        "city": "Bengaluru",
        "state": "KA",
        "postal_code": "560025",
        "country": "IN",
        "phone": "9800012345",
    })
}
