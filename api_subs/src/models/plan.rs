use chrono::{DateTime, Months, Utc};
use db::models::subscription::{PlanName, PlanType};

/// Plan granted by a product, with the credits for one billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanAllotment {
    pub plan_name: PlanName,
    pub credits_total: i32,
}

/// Product ids carry the plan name. Unrecognised products fall back to pro.
pub fn plan_for_product(product_id: &str) -> PlanName {
    if product_id.contains("basic") {
        PlanName::Basic
    } else if product_id.contains("pro") {
        PlanName::Pro
    } else if product_id.contains("max") {
        PlanName::Max
    } else {
        PlanName::Pro
    }
}

pub fn credits_for(plan_name: PlanName, plan_type: PlanType) -> i32 {
    match (plan_name, plan_type) {
        (PlanName::Basic, PlanType::Monthly) => 150,
        (PlanName::Basic, PlanType::Annual) => 1800,
        (PlanName::Pro, PlanType::Monthly) => 800,
        (PlanName::Pro, PlanType::Annual) => 9600,
        (PlanName::Max, PlanType::Monthly) => 4600,
        (PlanName::Max, PlanType::Annual) => 55200,
    }
}

pub fn allotment(product_id: &str, plan_type: PlanType) -> PlanAllotment {
    let plan_name = plan_for_product(product_id);
    PlanAllotment {
        plan_name,
        credits_total: credits_for(plan_name, plan_type),
    }
}

/// End of the billing period starting at `start`, in calendar months.
pub fn period_end(start: DateTime<Utc>, plan_type: PlanType) -> Option<DateTime<Utc>> {
    start.checked_add_months(Months::new(plan_type.period_months()))
}
