use std::sync::Arc;

use actix_web::{Responder, get, web};
use common::{error::Res, http::Success, jwt::Claims};
use db::SubscriptionStore;

use crate::services;

/// Retrieves the authenticated user's active subscription.
///
/// # Output
/// - Success: `{"subscription": {...} | null, "hasActiveSubscription": bool}`
/// - Error: 401 without session, 500 when the store cannot be read
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/subscription', { credentials: 'include' });
/// const { subscription, hasActiveSubscription } = await response.json();
/// if (hasActiveSubscription) {
///   console.log(`${subscription.creditsRemaining} credits left`);
/// }
/// ```
#[get("")]
async fn get_subscription(
    claims: web::ReqData<Claims>,
    store: web::Data<Arc<dyn SubscriptionStore>>,
) -> Res<impl Responder> {
    let response =
        services::subscription::get_user_subscription(store.get_ref().as_ref(), claims.user_id())
            .await?;

    Success::ok(response)
}
