use chrono::{DateTime, Utc};
use sqlx::types::JsonValue;
use uuid::Uuid;

use crate::models::subscription::{PlanName, PlanType, Subscription, SubscriptionStatus};

/// Row written when a checkout completes. Always inserted as `active` with
/// no credits used.
#[derive(Debug, Clone)]
pub struct SubscriptionCreateRequest {
    pub user_id: Uuid,
    pub creem_subscription_id: Option<String>,
    pub creem_customer_id: Option<String>,
    pub creem_checkout_id: Option<String>,
    pub plan_name: PlanName,
    pub plan_type: PlanType,
    pub product_id: String,
    pub amount: i64,
    pub currency: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub credits_total: i32,
    pub metadata: JsonValue,
}

/// Conditional status update: applied only while the row is still `from`.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: Option<bool>,
}

impl StatusChange {
    /// Superseded by a newer checkout.
    pub fn replace(at: DateTime<Utc>) -> Self {
        StatusChange {
            from: SubscriptionStatus::Active,
            to: SubscriptionStatus::Replaced,
            cancelled_at: Some(at),
            cancel_at_period_end: None,
        }
    }

    pub fn cancel() -> Self {
        StatusChange {
            from: SubscriptionStatus::Active,
            to: SubscriptionStatus::Cancelled,
            cancelled_at: None,
            cancel_at_period_end: Some(true),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}

/// Outcome of swapping a user's active subscription.
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Previously active rows, now `replaced`.
    pub replaced: Vec<Uuid>,
    pub inserted: Subscription,
}
