use common::error::{AppError, Res};
use db::SubscriptionStore;
use uuid::Uuid;

use crate::dtos::subscription::UserSubscriptionResponse;

/// Gets the user's current subscription.
/// Having none is a normal answer, not an error.
pub async fn get_user_subscription(
    store: &dyn SubscriptionStore,
    user_id: Uuid,
) -> Res<UserSubscriptionResponse> {
    let subscription = store.find_active(user_id).await.map_err(|e| {
        log::error!("Error fetching subscription for user {}: {}", user_id, e);
        AppError::Store("Failed to fetch subscription".to_string())
    })?;

    Ok(UserSubscriptionResponse {
        has_active_subscription: subscription.is_some(),
        subscription: subscription.map(Into::into),
    })
}
