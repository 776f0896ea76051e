#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use common::{
    creem::{CheckoutProvider, CheckoutRequest, CheckoutSession},
    env_config::{AuthConfig, Config, CreemConfig},
    error::{AppError, Res},
    jwt::generate_jwt,
};
use db::{
    SubscriptionStore,
    dtos::subscription::{Replacement, StatusChange, SubscriptionCreateRequest},
    models::subscription::Subscription,
};
use serde_json::json;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub fn config(webhook_secret: Option<&str>) -> Arc<Config> {
    Arc::new(Config {
        environment: "development".to_string(),
        database_url: None,
        server_host: "127.0.0.1".to_string(),
        server_port: 8080,
        num_workers: 1,
        cors_allowed_origin: "http://localhost:3000".to_string(),
        console_logging_enabled: false,
        log_file: "test.log".to_string(),
        app_url: "http://localhost:3000".to_string(),
        auth_config: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
        },
        creem: CreemConfig {
            api_key: Some("creem_test_key".to_string()),
            webhook_secret: webhook_secret.map(str::to_string),
            verify_signature: true,
            api_base_url: None,
        },
    })
}

pub fn bearer(user_id: Uuid) -> (&'static str, String) {
    let token = generate_jwt(
        user_id,
        Some("user@example.com".to_string()),
        1,
        &AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
        },
    )
    .unwrap();
    ("Authorization", format!("Bearer {}", token))
}

pub fn checkout_event(
    user_id: Uuid,
    checkout_id: &str,
    product_id: &str,
    plan_type: &str,
) -> String {
    json!({
        "id": format!("evt_{}", checkout_id),
        "eventType": "checkout.completed",
        "object": {
            "id": checkout_id,
            "metadata": { "user_id": user_id.to_string(), "plan_type": plan_type },
            "product": { "id": product_id, "price": 3900, "currency": "USD" },
            "customer": { "id": "cus_1" }
        }
    })
    .to_string()
}

/// Builds the api service with the given config, store and provider.
macro_rules! test_app {
    ($config:expr, $store:expr, $provider:expr) => {{
        let config: std::sync::Arc<common::env_config::Config> = $config;
        let store: std::sync::Arc<dyn db::SubscriptionStore> = $store;
        let provider: std::sync::Arc<dyn common::creem::CheckoutProvider> = $provider;
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new(config.clone()))
                .app_data(actix_web::web::Data::new(store))
                .app_data(actix_web::web::Data::new(provider))
                .app_data(common::http::json_config())
                .service(
                    actix_web::web::scope("/api")
                        .service(api_subs::mount_webhook())
                        .service(
                            api_subs::mount_pay().wrap(api_auth::auth_middleware(config.clone())),
                        )
                        .service(
                            api_subs::mount_subscription()
                                .wrap(api_auth::auth_middleware(config.clone())),
                        ),
                ),
        )
        .await
    }};
}

/// Provider double that records how often it was called.
pub struct FakeProvider {
    pub calls: AtomicUsize,
    pub last_request: std::sync::Mutex<Option<CheckoutRequest>>,
    pub fail_with_status: Option<u16>,
}

impl FakeProvider {
    pub fn ok() -> Arc<Self> {
        Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            last_request: std::sync::Mutex::new(None),
            fail_with_status: None,
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            last_request: std::sync::Mutex::new(None),
            fail_with_status: Some(status),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckoutProvider for FakeProvider {
    async fn create_checkout(&self, req: &CheckoutRequest) -> Res<CheckoutSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req.clone());

        if let Some(status) = self.fail_with_status {
            return Err(AppError::Upstream {
                message: "Failed to create checkout session".to_string(),
                details: json!({ "message": "product not found" }),
                debug: json!({ "status": status, "productId": req.product_id, "hasApiKey": true }),
            });
        }

        Ok(CheckoutSession {
            id: "ch_test_1".to_string(),
            checkout_url: Some("https://checkout.creem.io/ch_test_1".to_string()),
            url: None,
        })
    }
}

/// Store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl SubscriptionStore for FailingStore {
    async fn find_active(&self, _: Uuid) -> Res<Option<Subscription>> {
        Err(AppError::Internal("connection refused".to_string()))
    }
    async fn find_by_user(&self, _: Uuid) -> Res<Vec<Subscription>> {
        Err(AppError::Internal("connection refused".to_string()))
    }
    async fn find_by_checkout_id(&self, _: &str) -> Res<Option<Subscription>> {
        Err(AppError::Internal("connection refused".to_string()))
    }
    async fn replace_active(
        &self,
        _: SubscriptionCreateRequest,
        _: chrono::DateTime<chrono::Utc>,
    ) -> Res<Option<Replacement>> {
        Err(AppError::Internal("connection refused".to_string()))
    }
    async fn transition(&self, _: Uuid, _: StatusChange) -> Res<Option<Subscription>> {
        Err(AppError::Internal("connection refused".to_string()))
    }
}
