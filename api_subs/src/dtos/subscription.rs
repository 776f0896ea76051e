use chrono::{DateTime, Utc};
use db::models::subscription::{PlanName, PlanType, Subscription, SubscriptionStatus};
use serde::Serialize;
use uuid::Uuid;

/// Client view of a subscription row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub id: Uuid,
    pub plan_name: PlanName,
    pub plan_type: PlanType,
    pub status: SubscriptionStatus,
    pub credits_total: i32,
    pub credits_used: i32,
    pub credits_remaining: i32,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Major currency units.
    pub amount: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        SubscriptionView {
            id: sub.id,
            plan_name: sub.plan_name,
            plan_type: sub.plan_type,
            status: sub.status,
            credits_total: sub.credits_total,
            credits_used: sub.credits_used,
            credits_remaining: sub.credits_remaining(),
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            cancelled_at: sub.cancelled_at,
            amount: sub.amount as f64 / 100.0,
            currency: sub.currency,
            created_at: sub.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscriptionResponse {
    pub subscription: Option<SubscriptionView>,
    pub has_active_subscription: bool,
}
