use db::models::subscription::PlanType;
use serde::{Deserialize, Serialize};

fn default_units() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutCreateRequest {
    #[serde(default)]
    pub product_id: String,
    pub plan_type: Option<PlanType>,
    #[serde(default = "default_units")]
    pub units: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutCreateResponse {
    pub checkout_url: Option<String>,
    pub session_id: String,
    pub request_id: String,
}
