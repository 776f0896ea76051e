use chrono::{DateTime, Utc};
use common::{
    creem::{CheckoutCustomer, CheckoutMetadata, CheckoutProvider, CheckoutRequest},
    error::{AppError, Res},
    jwt::Claims,
};

use crate::dtos::checkout::{CheckoutCreateRequest, CheckoutCreateResponse};

/// Tracking id sent with the checkout, unique per user and millisecond.
pub fn request_id(claims: &Claims, now: DateTime<Utc>) -> String {
    format!("req_{}_{}", claims.user_id(), now.timestamp_millis())
}

pub fn success_url(origin: &str) -> String {
    format!(
        "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
        origin.trim_end_matches('/')
    )
}

/// Validates the request before anything is sent to the provider.
pub fn validate(req: &CheckoutCreateRequest) -> Res<()> {
    if req.product_id.trim().is_empty() {
        return Err(AppError::BadRequest("Product ID is required".to_string()));
    }
    if req.units == 0 {
        return Err(AppError::BadRequest("Units must be at least 1".to_string()));
    }
    Ok(())
}

/// Builds the provider request. User id and plan type travel as metadata
/// and come back with the `checkout.completed` webhook.
pub fn build_checkout_request(
    claims: &Claims,
    req: &CheckoutCreateRequest,
    origin: &str,
    now: DateTime<Utc>,
) -> CheckoutRequest {
    CheckoutRequest {
        product_id: req.product_id.trim().to_string(),
        request_id: request_id(claims, now),
        units: req.units,
        customer: claims
            .email
            .clone()
            .map(|email| CheckoutCustomer { email }),
        success_url: success_url(origin),
        metadata: CheckoutMetadata {
            user_id: claims.user_id().to_string(),
            plan_type: req.plan_type.map(|plan_type| plan_type.to_string()),
        },
    }
}

/// Starts a hosted checkout session for the user.
pub async fn create_checkout(
    provider: &dyn CheckoutProvider,
    claims: &Claims,
    req: CheckoutCreateRequest,
    origin: &str,
) -> Res<CheckoutCreateResponse> {
    validate(&req)?;

    let checkout = build_checkout_request(claims, &req, origin, Utc::now());
    log::info!(
        "Checkout requested: user={} product={} plan_type={:?} units={}",
        claims.user_id(),
        checkout.product_id,
        req.plan_type,
        checkout.units
    );

    let session = provider.create_checkout(&checkout).await?;
    if session.redirect_url().is_none() {
        log::warn!("Checkout session {} came back without a URL", session.id);
    }
    log::info!("Checkout session created: {}", session.id);

    Ok(CheckoutCreateResponse {
        checkout_url: session.redirect_url().map(str::to_string),
        session_id: session.id,
        request_id: checkout.request_id,
    })
}
