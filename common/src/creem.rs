use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    env_config::CreemConfig,
    error::{AppError, Res},
};

pub const TEST_KEY_PREFIX: &str = "creem_test_";
pub const TEST_API_URL: &str = "https://test-api.creem.io/v1";
pub const LIVE_API_URL: &str = "https://api.creem.io/v1";

/// Starts hosted checkout sessions with the payment provider.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_checkout(&self, req: &CheckoutRequest) -> Res<CheckoutSession>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub request_id: String,
    pub units: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CheckoutCustomer>,
    pub success_url: String,
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutCustomer {
    pub email: String,
}

/// Round-tripped by the provider into the `checkout.completed` webhook.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutMetadata {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_url: Option<String>,
    pub url: Option<String>,
}

impl CheckoutSession {
    pub fn redirect_url(&self) -> Option<&str> {
        self.checkout_url.as_deref().or(self.url.as_deref())
    }
}

/// HTTP client for the Creem API.
pub struct CreemClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

/// Builds the client once at start-up. The base URL follows the key type
/// unless overridden.
pub fn create_client(config: &CreemConfig) -> CreemClient {
    let base_url = config
        .api_base_url
        .clone()
        .unwrap_or_else(|| base_url_for(config.api_key.as_deref()).to_string());

    CreemClient {
        http: reqwest::Client::new(),
        api_key: config.api_key.clone(),
        base_url: base_url.trim_end_matches('/').to_string(),
    }
}

/// Test keys talk to the test API, everything else to the live one.
pub fn base_url_for(api_key: Option<&str>) -> &'static str {
    match api_key {
        Some(key) if key.starts_with(TEST_KEY_PREFIX) => TEST_API_URL,
        _ => LIVE_API_URL,
    }
}

impl CreemClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_test_mode(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| key.starts_with(TEST_KEY_PREFIX))
    }
}

#[async_trait]
impl CheckoutProvider for CreemClient {
    async fn create_checkout(&self, req: &CheckoutRequest) -> Res<CheckoutSession> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("Payment system not configured".to_string()))?;

        log::info!(
            "Creating Creem checkout: product={} request_id={} test_mode={}",
            req.product_id,
            req.request_id,
            self.is_test_mode()
        );

        let response = self
            .http
            .post(format!("{}/checkouts", self.base_url))
            .header("x-api-key", api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        log::debug!("Creem response status={} body={}", status, text);

        if !status.is_success() {
            let details = serde_json::from_str::<Value>(&text)
                .unwrap_or_else(|_| json!({ "message": text }));
            return Err(AppError::Upstream {
                message: "Failed to create checkout session".to_string(),
                details,
                debug: json!({
                    "status": status.as_u16(),
                    "productId": req.product_id,
                    "hasApiKey": true,
                }),
            });
        }

        serde_json::from_str::<CheckoutSession>(&text).map_err(|e| {
            AppError::Internal(format!("Failed to parse Creem checkout response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    use super::*;

    fn config(api_key: Option<&str>, base: Option<String>) -> CreemConfig {
        CreemConfig {
            api_key: api_key.map(str::to_string),
            webhook_secret: None,
            verify_signature: true,
            api_base_url: base,
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            product_id: "prod_pro_monthly".to_string(),
            request_id: "req_u_1".to_string(),
            units: 1,
            customer: None,
            success_url: "http://localhost:3000/payment/success".to_string(),
            metadata: CheckoutMetadata {
                user_id: "u".to_string(),
                plan_type: Some("monthly".to_string()),
            },
        }
    }

    #[test]
    fn key_prefix_selects_endpoint() {
        assert_eq!(create_client(&config(Some("creem_test_abc"), None)).base_url(), TEST_API_URL);
        assert_eq!(create_client(&config(Some("creem_abc"), None)).base_url(), LIVE_API_URL);
        assert_eq!(create_client(&config(None, None)).base_url(), LIVE_API_URL);
    }

    #[tokio::test]
    async fn missing_key_is_a_config_error() {
        let client = create_client(&config(None, Some("http://127.0.0.1:9".to_string())));
        let err = client.create_checkout(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn posts_checkout_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkouts"))
            .and(header("x-api-key", "creem_test_abc"))
            .and(body_partial_json(json!({
                "product_id": "prod_pro_monthly",
                "metadata": { "user_id": "u", "plan_type": "monthly" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ch_1",
                "checkout_url": "https://creem.io/checkout/ch_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_client(&config(Some("creem_test_abc"), Some(server.uri())));
        let session = client.create_checkout(&request()).await.unwrap();

        assert_eq!(session.id, "ch_1");
        assert_eq!(session.redirect_url(), Some("https://creem.io/checkout/ch_1"));
    }

    #[tokio::test]
    async fn provider_error_body_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkouts"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such product"))
            .mount(&server)
            .await;

        let client = create_client(&config(Some("creem_abc"), Some(server.uri())));
        match client.create_checkout(&request()).await {
            Err(AppError::Upstream { details, debug, .. }) => {
                assert_eq!(details, json!({ "message": "no such product" }));
                assert_eq!(debug["status"], 404);
                assert_eq!(debug["productId"], "prod_pro_monthly");
            }
            other => panic!("expected upstream error, got {:?}", other.map(|s| s.id)),
        }
    }
}
