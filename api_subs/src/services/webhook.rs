use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::{
    SubscriptionStore,
    dtos::subscription::{StatusChange, SubscriptionCreateRequest},
    models::subscription::{PlanType, Subscription, SubscriptionStatus},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dtos::webhook::{CheckoutObject, SubscriptionObject},
    models::{
        event::{EventKind, WebhookEvent},
        plan,
    },
};

/// Routes an event to its handler. Handlers never fail: anything that goes
/// wrong after the event was accepted is logged, so the provider does not
/// redeliver an event that may already have changed state.
pub async fn dispatch(store: &dyn SubscriptionStore, event: &WebhookEvent) {
    log::info!(
        "Processing webhook event: {:?} (id={})",
        event.kind,
        event.id.as_deref().unwrap_or("-")
    );

    match &event.kind {
        EventKind::CheckoutCompleted => {
            handle_checkout_completed(store, &event.data, Utc::now()).await;
        }
        EventKind::PaymentSucceeded => {
            log::info!("Payment succeeded: {}", object_id(&event.data));
        }
        EventKind::SubscriptionCreated => {
            log::info!("Subscription created: {}", object_id(&event.data));
        }
        EventKind::SubscriptionUpdated => {
            log::info!("Subscription updated: {}", object_id(&event.data));
        }
        EventKind::SubscriptionCancelled => {
            handle_subscription_cancelled(store, &event.data).await;
        }
        EventKind::Unknown(event_type) => {
            log::info!(
                "Unhandled event type: {}",
                event_type.as_deref().unwrap_or("<missing>")
            );
        }
    }
}

fn object_id(data: &Value) -> &str {
    data.get("id").and_then(Value::as_str).unwrap_or("-")
}

/// Creates the user's new active subscription from a completed checkout.
pub async fn handle_checkout_completed(
    store: &dyn SubscriptionStore,
    data: &Value,
    now: DateTime<Utc>,
) -> Option<Subscription> {
    match checkout_completed(store, data, now).await {
        Ok(created) => created,
        Err(e) => {
            log::error!("Error in checkout completed handler: {}", e);
            None
        }
    }
}

async fn checkout_completed(
    store: &dyn SubscriptionStore,
    data: &Value,
    now: DateTime<Utc>,
) -> Res<Option<Subscription>> {
    let checkout = match serde_json::from_value::<CheckoutObject>(data.clone()) {
        Ok(checkout) => checkout,
        Err(e) => {
            log::error!("Unreadable checkout object ({}): {}", e, data);
            return Ok(None);
        }
    };

    let Some(user_id) = checkout.metadata_str("user_id") else {
        log::error!("No user_id in checkout metadata: {}", data);
        return Ok(None);
    };
    let Ok(user_id) = user_id.parse::<Uuid>() else {
        log::error!("Checkout metadata user_id is not a UUID: {}", user_id);
        return Ok(None);
    };
    let Some(product_id) = checkout.product_id() else {
        log::error!("No product id in checkout: {}", data);
        return Ok(None);
    };

    let plan_type = match checkout.metadata_str("plan_type") {
        Some(raw) => raw.parse::<PlanType>().unwrap_or_else(|e| {
            log::warn!("{}, using monthly", e);
            PlanType::Monthly
        }),
        None => {
            log::warn!("No plan_type in checkout metadata, using monthly");
            PlanType::Monthly
        }
    };

    // early exit for redeliveries; replace_active repeats the check atomically
    if let Some(checkout_id) = checkout.id.as_deref() {
        if let Some(existing) = store.find_by_checkout_id(checkout_id).await? {
            log::info!(
                "Checkout {} already recorded as subscription {}, skipping",
                checkout_id,
                existing.id
            );
            return Ok(None);
        }
    }

    let allotment = plan::allotment(product_id, plan_type);
    let period_end = plan::period_end(now, plan_type)
        .ok_or_else(|| AppError::Internal("Billing period end out of range".to_string()))?;

    log::info!(
        "Checkout completed: user={} product={} plan={} type={} credits={}",
        user_id,
        product_id,
        allotment.plan_name,
        plan_type,
        allotment.credits_total
    );

    let request = SubscriptionCreateRequest {
        user_id,
        creem_subscription_id: checkout.subscription_id().map(str::to_string),
        creem_customer_id: checkout.customer_id().map(str::to_string),
        creem_checkout_id: checkout.id.clone(),
        plan_name: allotment.plan_name,
        plan_type,
        product_id: product_id.to_string(),
        amount: checkout.amount(),
        currency: checkout.currency(),
        current_period_start: now,
        current_period_end: period_end,
        credits_total: allotment.credits_total,
        metadata: checkout
            .metadata
            .clone()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Default::default())),
    };

    let checkout_id = request.creem_checkout_id.clone();
    let Some(replacement) = store.replace_active(request, now).await? else {
        log::info!(
            "Checkout {} was recorded concurrently, skipping",
            checkout_id.as_deref().unwrap_or("-")
        );
        return Ok(None);
    };
    for id in &replacement.replaced {
        log::info!("Marked subscription {} as replaced", id);
    }
    log::info!(
        "Subscription {} created for user {}",
        replacement.inserted.id,
        user_id
    );

    Ok(Some(replacement.inserted))
}

/// Cancels the user's active subscription at period end. Returns the ids of
/// the cancelled rows.
pub async fn handle_subscription_cancelled(
    store: &dyn SubscriptionStore,
    data: &Value,
) -> Vec<Uuid> {
    match subscription_cancelled(store, data).await {
        Ok(cancelled) => cancelled,
        Err(e) => {
            log::error!("Error cancelling subscription: {}", e);
            Vec::new()
        }
    }
}

async fn subscription_cancelled(store: &dyn SubscriptionStore, data: &Value) -> Res<Vec<Uuid>> {
    let object = serde_json::from_value::<SubscriptionObject>(data.clone()).unwrap_or_default();

    let Some(user_id) = object.user_id() else {
        log::error!("No user_id in cancelled subscription metadata: {}", data);
        return Ok(Vec::new());
    };
    let Ok(user_id) = user_id.parse::<Uuid>() else {
        log::error!("Cancelled subscription user_id is not a UUID: {}", user_id);
        return Ok(Vec::new());
    };

    let rows = store.find_by_user(user_id).await?;
    if rows.is_empty() {
        log::warn!("No subscription found to cancel for user {}", user_id);
        return Ok(Vec::new());
    }

    let mut cancelled = Vec::new();
    for row in rows {
        if row.status == SubscriptionStatus::Cancelled {
            continue;
        }
        if !row.status.can_transition_to(SubscriptionStatus::Cancelled) {
            log::warn!(
                "Refusing to cancel subscription {} in status {}",
                row.id,
                row.status
            );
            continue;
        }

        match store.transition(row.id, StatusChange::cancel()).await? {
            Some(updated) => {
                log::info!("Subscription {} cancelled for user {}", updated.id, user_id);
                cancelled.push(updated.id);
            }
            None => log::warn!("Subscription {} changed status before cancellation", row.id),
        }
    }

    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration;
    use db::MemorySubscriptionStore;
    use db::dtos::subscription::Replacement;
    use db::models::subscription::PlanName;
    use serde_json::json;

    use super::*;

    /// Memory store whose checkout lookup always misses, as when a
    /// redelivery races the first delivery past the early check.
    struct RacingStore(MemorySubscriptionStore);

    #[async_trait]
    impl SubscriptionStore for RacingStore {
        async fn find_active(&self, user_id: Uuid) -> Res<Option<Subscription>> {
            self.0.find_active(user_id).await
        }
        async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
            self.0.find_by_user(user_id).await
        }
        async fn find_by_checkout_id(&self, _: &str) -> Res<Option<Subscription>> {
            Ok(None)
        }
        async fn replace_active(
            &self,
            data: SubscriptionCreateRequest,
            at: DateTime<Utc>,
        ) -> Res<Option<Replacement>> {
            self.0.replace_active(data, at).await
        }
        async fn transition(&self, id: Uuid, change: StatusChange) -> Res<Option<Subscription>> {
            self.0.transition(id, change).await
        }
    }

    fn checkout(user_id: &str, checkout_id: &str, product: &str, plan_type: &str) -> Value {
        json!({
            "id": checkout_id,
            "metadata": { "user_id": user_id, "plan_type": plan_type },
            "product": { "id": product, "price": 3900, "currency": "USD" },
            "customer": { "id": "cus_1" }
        })
    }

    #[actix_web::test]
    async fn pro_monthly_checkout_creates_active_row() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let created = handle_checkout_completed(
            &store,
            &checkout(&user.to_string(), "ch_1", "prod_pro_monthly", "monthly"),
            now,
        )
        .await
        .unwrap();

        assert_eq!(created.plan_name, PlanName::Pro);
        assert_eq!(created.plan_type, PlanType::Monthly);
        assert_eq!(created.credits_total, 800);
        assert_eq!(created.credits_used, 0);
        assert_eq!(created.status, SubscriptionStatus::Active);
        assert_eq!(created.amount, 3900);
        assert_eq!(created.creem_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(created.creem_checkout_id.as_deref(), Some("ch_1"));
        assert_eq!(created.metadata["user_id"], user.to_string());
        assert_eq!(created.current_period_start, now);

        let length = created.current_period_end - now;
        assert!(length >= Duration::days(28) && length <= Duration::days(31));
    }

    #[actix_web::test]
    async fn annual_period_is_one_year() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let created = handle_checkout_completed(
            &store,
            &checkout(&user.to_string(), "ch_1", "max_annual", "annual"),
            now,
        )
        .await
        .unwrap();

        assert_eq!(created.plan_name, PlanName::Max);
        assert_eq!(created.credits_total, 55200);
        let length = created.current_period_end - now;
        assert!(length >= Duration::days(365) && length <= Duration::days(366));
    }

    #[actix_web::test]
    async fn second_checkout_replaces_first() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();

        let first = handle_checkout_completed(
            &store,
            &checkout(&user.to_string(), "ch_1", "prod_basic", "monthly"),
            Utc::now(),
        )
        .await
        .unwrap();
        let second = handle_checkout_completed(
            &store,
            &checkout(&user.to_string(), "ch_2", "max_monthly", "monthly"),
            Utc::now(),
        )
        .await
        .unwrap();

        let rows = store.all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.is_active()).count(), 1);

        let old = rows.iter().find(|r| r.id == first.id).unwrap();
        assert_eq!(old.status, SubscriptionStatus::Replaced);
        assert!(old.cancelled_at.is_some());
        assert_eq!(store.find_active(user).await.unwrap().unwrap().id, second.id);
    }

    #[actix_web::test]
    async fn incomplete_checkouts_write_nothing() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4().to_string();

        let cases = [
            json!({ "id": "ch_1", "product": { "id": "prod_pro" } }),
            json!({ "id": "ch_2", "metadata": { "user_id": user } }),
            json!({ "id": "ch_3", "metadata": { "user_id": "not-a-uuid" }, "product": "prod_pro" }),
            json!("garbage"),
            Value::Null,
        ];
        for data in cases {
            // replays included
            for _ in 0..2 {
                assert!(handle_checkout_completed(&store, &data, Utc::now()).await.is_none());
            }
        }

        assert!(store.all().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn redelivered_checkout_is_ignored() {
        let store = MemorySubscriptionStore::new();
        let data = checkout(&Uuid::new_v4().to_string(), "ch_1", "prod_pro", "monthly");

        assert!(handle_checkout_completed(&store, &data, Utc::now()).await.is_some());
        assert!(handle_checkout_completed(&store, &data, Utc::now()).await.is_none());

        let rows = store.all().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_active());
    }

    #[actix_web::test]
    async fn racing_redelivery_does_not_replace_its_own_row() {
        let store = RacingStore(MemorySubscriptionStore::new());
        let data = checkout(&Uuid::new_v4().to_string(), "ch_1", "prod_pro", "monthly");

        let first = handle_checkout_completed(&store, &data, Utc::now()).await.unwrap();
        assert!(handle_checkout_completed(&store, &data, Utc::now()).await.is_none());

        let rows = store.0.all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.id);
        assert!(rows[0].is_active());
    }

    #[actix_web::test]
    async fn string_amount_does_not_drop_the_checkout() {
        let store = MemorySubscriptionStore::new();
        let data = json!({
            "id": "ch_1",
            "metadata": { "user_id": Uuid::new_v4().to_string(), "plan_type": "monthly" },
            "order": { "product": "prod_pro", "amount": "3900", "currency": "USD" }
        });

        let created = handle_checkout_completed(&store, &data, Utc::now()).await.unwrap();
        assert_eq!(created.amount, 3900);
        assert_eq!(created.credits_total, 800);
    }

    #[actix_web::test]
    async fn missing_plan_type_defaults_to_monthly() {
        let store = MemorySubscriptionStore::new();
        let data = json!({
            "id": "ch_1",
            "metadata": { "user_id": Uuid::new_v4().to_string() },
            "order": { "product": "prod_basic", "amount": 900, "customer": "cus_9" }
        });

        let created = handle_checkout_completed(&store, &data, Utc::now()).await.unwrap();
        assert_eq!(created.plan_type, PlanType::Monthly);
        assert_eq!(created.credits_total, 150);
        assert_eq!(created.amount, 900);
        assert_eq!(created.creem_customer_id.as_deref(), Some("cus_9"));
    }

    #[actix_web::test]
    async fn cancellation_keeps_credits_and_skips_replaced_rows() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();

        handle_checkout_completed(
            &store,
            &checkout(&user.to_string(), "ch_1", "prod_pro", "monthly"),
            Utc::now(),
        )
        .await
        .unwrap();
        let active = handle_checkout_completed(
            &store,
            &checkout(&user.to_string(), "ch_2", "prod_pro", "monthly"),
            Utc::now(),
        )
        .await
        .unwrap();

        let cancelled = handle_subscription_cancelled(
            &store,
            &json!({ "id": "sub_1", "metadata": { "user_id": user.to_string() } }),
        )
        .await;
        assert_eq!(cancelled, vec![active.id]);

        let rows = store.all().unwrap();
        let row = rows.iter().find(|r| r.id == active.id).unwrap();
        assert_eq!(row.status, SubscriptionStatus::Cancelled);
        assert!(row.cancel_at_period_end);
        assert_eq!(row.credits_used, 0);
        assert_eq!(row.credits_total, 800);
        assert!(rows.iter().any(|r| r.status == SubscriptionStatus::Replaced));

        // delivering it again changes nothing
        let again = handle_subscription_cancelled(
            &store,
            &json!({ "metadata": { "user_id": user.to_string() } }),
        )
        .await;
        assert!(again.is_empty());
    }

    #[actix_web::test]
    async fn cancellation_without_user_is_ignored() {
        let store = MemorySubscriptionStore::new();
        assert!(handle_subscription_cancelled(&store, &json!({ "id": "sub_1" })).await.is_empty());
        assert!(handle_subscription_cancelled(&store, &Value::Null).await.is_empty());
    }

    #[actix_web::test]
    async fn informational_events_do_not_write() {
        let store = MemorySubscriptionStore::new();
        for body in [
            r#"{"eventType":"payment.succeeded","object":{"id":"pay_1"}}"#,
            r#"{"eventType":"subscription.created","object":{"id":"sub_1"}}"#,
            r#"{"eventType":"subscription.updated","object":{"id":"sub_1"}}"#,
            r#"{"eventType":"refund.created","object":{}}"#,
        ] {
            dispatch(&store, &WebhookEvent::parse(body).unwrap()).await;
        }
        assert!(store.all().unwrap().is_empty());
    }
}
