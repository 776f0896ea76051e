use std::sync::Arc;

use actix_web::{HttpRequest, Responder, post, web};
use common::{
    creem::CheckoutProvider,
    env_config::Config,
    error::{AppError, Res},
    http::Success,
    jwt::Claims,
};
use db::SubscriptionStore;

use crate::{
    dtos::{checkout::CheckoutCreateRequest, webhook::WebhookResponse},
    models::event::WebhookEvent,
    services::{
        self,
        signature::{SIGNATURE_HEADER, verify_signature},
    },
};

/// Handles Creem webhook events for subscription bookkeeping.
///
/// # Input
/// - `payload`: Raw body containing the webhook event
/// - `req`: HTTP request carrying the `creem-signature` header
/// - `config`: Application configuration with the webhook secret
/// - `store`: Subscription store
///
/// # Output
/// - Success: 200 `{"received": true}` once the event was dispatched,
///   whatever the handler did with it
/// - Error: 400 without signature header, 401 for a bad signature,
///   500 when the secret is not configured or the body is not an event envelope
///
/// # Note
/// This endpoint is called by Creem, not by the web application.
/// Register `https://yourapp.com/api/payment/webhook` in the Creem dashboard
/// and set the signing secret as `CREEM_WEBHOOK_SECRET`.
///
/// # Event Types Handled
/// - checkout.completed / checkout.session.completed: creates the new active subscription
/// - subscription.cancelled: cancels the user's active subscription at period end
/// - payment.succeeded, subscription.created, subscription.updated: logged only
#[post("")]
async fn post_webhook(
    payload: web::Bytes,
    req: HttpRequest,
    config: web::Data<Arc<Config>>,
    store: web::Data<Arc<dyn SubscriptionStore>>,
) -> Res<impl Responder> {
    let signature = match req.headers().get(SIGNATURE_HEADER) {
        Some(signature) if !signature.is_empty() => signature.to_str().unwrap_or(""),
        _ => {
            log::error!("Webhook received without signature");
            return Err(AppError::BadRequest("No signature provided".to_string()));
        }
    };

    let Some(secret) = config.creem.webhook_secret.as_deref() else {
        return Err(AppError::Config("Webhook secret not configured".to_string()));
    };

    if config.creem.verify_signature {
        if !verify_signature(&payload, signature, secret) {
            log::warn!("Webhook signature mismatch");
            return Err(AppError::Unauthorized("Invalid signature".to_string()));
        }
    } else {
        log::warn!("Webhook signature verification is disabled");
    }

    let body = std::str::from_utf8(&payload)
        .map_err(|e| AppError::MalformedPayload(format!("Webhook body is not UTF-8: {}", e)))?;
    let event = WebhookEvent::parse(body)?;

    services::webhook::dispatch(store.get_ref().as_ref(), &event).await;

    Success::ok(WebhookResponse { received: true })
}

/// Starts a Creem hosted checkout for the authenticated user.
///
/// # Input
/// - `claims`: Session claims of the authenticated user
/// - `body`: JSON payload:
///   - `productId`: Creem product id (required)
///   - `planType`: `monthly` or `annual` (optional, round-tripped to the webhook)
///   - `units`: Quantity (optional, default 1)
/// - `provider`: Payment provider client
///
/// # Output
/// - Success: `{"checkoutUrl", "sessionId", "requestId"}`
/// - Error: 400 without product id, 401 without session, 500 when the provider
///   is not configured or rejects the request (`details` carries its answer)
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/payment/create-checkout', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json' },
///   credentials: 'include',
///   body: JSON.stringify({ productId: 'prod_pro_monthly', planType: 'monthly' })
/// });
///
/// if (response.ok) {
///   const { checkoutUrl } = await response.json();
///   window.location.href = checkoutUrl;
/// }
/// ```
#[post("/create-checkout")]
async fn post_create_checkout(
    claims: web::ReqData<Claims>,
    body: web::Json<CheckoutCreateRequest>,
    req: HttpRequest,
    config: web::Data<Arc<Config>>,
    provider: web::Data<Arc<dyn CheckoutProvider>>,
) -> Res<impl Responder> {
    let origin = req
        .headers()
        .get("origin")
        .and_then(|origin| origin.to_str().ok())
        .filter(|origin| !origin.is_empty())
        .unwrap_or(config.app_url.as_str())
        .to_string();

    let response = services::checkout::create_checkout(
        provider.get_ref().as_ref(),
        &claims,
        body.into_inner(),
        &origin,
    )
    .await?;

    Success::ok(response)
}
