use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Replaced,
}

impl SubscriptionStatus {
    /// Allowed transitions: an active subscription is either superseded by a
    /// newer one or cancelled. Nothing leads back to `Active`.
    pub fn can_transition_to(self, next: SubscriptionStatus) -> bool {
        matches!(
            (self, next),
            (SubscriptionStatus::Active, SubscriptionStatus::Replaced)
                | (SubscriptionStatus::Active, SubscriptionStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Replaced => "replaced",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_plan", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanName {
    Basic,
    Pro,
    Max,
}

impl PlanName {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanName::Basic => "basic",
            PlanName::Pro => "pro",
            PlanName::Max => "max",
        }
    }
}

impl fmt::Display for PlanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing interval of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    #[default]
    Monthly,
    Annual,
}

impl PlanType {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Annual => "annual",
        }
    }

    /// Length of one billing period in calendar months.
    pub fn period_months(self) -> u32 {
        match self {
            PlanType::Monthly => 1,
            PlanType::Annual => 12,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PlanType::Monthly),
            "annual" => Ok(PlanType::Annual),
            other => Err(format!("unknown plan type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub creem_subscription_id: Option<String>,
    pub creem_customer_id: Option<String>,
    pub creem_checkout_id: Option<String>,
    pub plan_name: PlanName,
    pub plan_type: PlanType,
    pub product_id: String,
    /// Minor currency units (cents).
    pub amount: i64,
    pub currency: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub credits_total: i32,
    pub credits_used: i32,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn credits_remaining(&self) -> i32 {
        (self.credits_total - self.credits_used).max(0)
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
