use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::subscription::{Replacement, StatusChange, SubscriptionCreateRequest},
    models::subscription::{Subscription, SubscriptionStatus},
    subscription,
};

/// Access to the subscriptions table. Webhooks carry no end-user session,
/// so implementations act with full privileges.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Most recently created `active` row of the user.
    async fn find_active(&self, user_id: Uuid) -> Res<Option<Subscription>>;

    /// All rows of the user, newest first.
    async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>>;

    async fn find_by_checkout_id(&self, checkout_id: &str) -> Res<Option<Subscription>>;

    /// Demotes the user's active rows to `replaced` and inserts `data` as the
    /// new active row, as a single unit serialized per user. `None` when a row
    /// for `data.creem_checkout_id` already exists; nothing is written then.
    async fn replace_active(
        &self,
        data: SubscriptionCreateRequest,
        at: DateTime<Utc>,
    ) -> Res<Option<Replacement>>;

    /// Applies a status transition to one row. `None` when the row is no
    /// longer in `change.from`.
    async fn transition(&self, id: Uuid, change: StatusChange) -> Res<Option<Subscription>>;
}

fn ensure_allowed(change: &StatusChange) -> Res<()> {
    if change.is_allowed() {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "Invalid subscription transition {} -> {}",
            change.from, change.to
        )))
    }
}

pub struct PgSubscriptionStore {
    pool: Arc<PgPool>,
}

impl PgSubscriptionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgSubscriptionStore { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_active(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        subscription::get_active_subscription_by_user_id(&*self.pool, user_id).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        subscription::get_subscriptions_by_user_id(&*self.pool, user_id).await
    }

    async fn find_by_checkout_id(&self, checkout_id: &str) -> Res<Option<Subscription>> {
        subscription::get_subscription_by_checkout_id(&*self.pool, checkout_id).await
    }

    async fn replace_active(
        &self,
        data: SubscriptionCreateRequest,
        at: DateTime<Utc>,
    ) -> Res<Option<Replacement>> {
        let change = StatusChange::replace(at);
        ensure_allowed(&change)?;

        let mut tx = self.pool.begin().await?;
        // held until commit; a concurrent checkout of the same user waits here
        // and then sees this transaction's row as the one to demote
        subscription::lock_user(&mut *tx, data.user_id).await?;

        if let Some(checkout_id) = data.creem_checkout_id.as_deref() {
            if subscription::get_subscription_by_checkout_id(&mut *tx, checkout_id)
                .await?
                .is_some()
            {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        let replaced =
            subscription::update_user_subscriptions_status(&mut *tx, data.user_id, change).await?;
        let inserted = subscription::insert_subscription(&mut *tx, data).await?;
        tx.commit().await?;

        Ok(Some(Replacement { replaced, inserted }))
    }

    async fn transition(&self, id: Uuid, change: StatusChange) -> Res<Option<Subscription>> {
        ensure_allowed(&change)?;
        subscription::update_subscription_status(&*self.pool, id, change).await
    }
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    rows: Mutex<Vec<Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row in insertion order.
    pub fn all(&self) -> Res<Vec<Subscription>> {
        Ok(self.lock()?.clone())
    }

    /// Stores a row as-is.
    pub fn seed(&self, row: Subscription) -> Res<()> {
        self.lock()?.push(row);
        Ok(())
    }

    fn lock(&self) -> Res<std::sync::MutexGuard<'_, Vec<Subscription>>> {
        self.rows
            .lock()
            .map_err(|_| AppError::Internal("Subscription store lock poisoned".to_string()))
    }
}

fn apply(row: &mut Subscription, change: &StatusChange, at: DateTime<Utc>) {
    row.status = change.to;
    if let Some(cancelled_at) = change.cancelled_at {
        row.cancelled_at = Some(cancelled_at);
    }
    if let Some(flag) = change.cancel_at_period_end {
        row.cancel_at_period_end = flag;
    }
    row.updated_at = at;
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn find_active(&self, user_id: Uuid) -> Res<Option<Subscription>> {
        let rows = self.lock()?;
        Ok(rows
            .iter()
            .filter(|row| row.user_id == user_id && row.is_active())
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Res<Vec<Subscription>> {
        let rows = self.lock()?;
        let mut found: Vec<Subscription> = rows
            .iter()
            .rev()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_checkout_id(&self, checkout_id: &str) -> Res<Option<Subscription>> {
        let rows = self.lock()?;
        Ok(rows
            .iter()
            .find(|row| row.creem_checkout_id.as_deref() == Some(checkout_id))
            .cloned())
    }

    async fn replace_active(
        &self,
        data: SubscriptionCreateRequest,
        at: DateTime<Utc>,
    ) -> Res<Option<Replacement>> {
        let change = StatusChange::replace(at);
        ensure_allowed(&change)?;

        let mut rows = self.lock()?;
        if let Some(checkout_id) = data.creem_checkout_id.as_deref() {
            if rows
                .iter()
                .any(|row| row.creem_checkout_id.as_deref() == Some(checkout_id))
            {
                return Ok(None);
            }
        }

        let mut replaced = Vec::new();
        for row in rows
            .iter_mut()
            .filter(|row| row.user_id == data.user_id && row.status == change.from)
        {
            apply(row, &change, at);
            replaced.push(row.id);
        }

        let inserted = Subscription {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            creem_subscription_id: data.creem_subscription_id,
            creem_customer_id: data.creem_customer_id,
            creem_checkout_id: data.creem_checkout_id,
            plan_name: data.plan_name,
            plan_type: data.plan_type,
            product_id: data.product_id,
            amount: data.amount,
            currency: data.currency,
            status: SubscriptionStatus::Active,
            current_period_start: data.current_period_start,
            current_period_end: data.current_period_end,
            cancel_at_period_end: false,
            cancelled_at: None,
            credits_total: data.credits_total,
            credits_used: 0,
            metadata: data.metadata,
            created_at: at,
            updated_at: at,
        };
        rows.push(inserted.clone());

        Ok(Some(Replacement { replaced, inserted }))
    }

    async fn transition(&self, id: Uuid, change: StatusChange) -> Res<Option<Subscription>> {
        ensure_allowed(&change)?;

        let mut rows = self.lock()?;
        Ok(rows
            .iter_mut()
            .find(|row| row.id == id && row.status == change.from)
            .map(|row| {
                apply(row, &change, Utc::now());
                row.clone()
            }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::models::subscription::{PlanName, PlanType};

    fn request(user_id: Uuid, checkout_id: &str) -> SubscriptionCreateRequest {
        let now = Utc::now();
        SubscriptionCreateRequest {
            user_id,
            creem_subscription_id: Some(checkout_id.to_string()),
            creem_customer_id: Some("cus_1".to_string()),
            creem_checkout_id: Some(checkout_id.to_string()),
            plan_name: PlanName::Pro,
            plan_type: PlanType::Monthly,
            product_id: "prod_pro".to_string(),
            amount: 3900,
            currency: "USD".to_string(),
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            credits_total: 800,
            metadata: json!({ "user_id": user_id.to_string() }),
        }
    }

    #[tokio::test]
    async fn replace_keeps_a_single_active_row() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();

        let first = store
            .replace_active(request(user, "ch_1"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(first.replaced.is_empty());

        let second = store
            .replace_active(request(user, "ch_2"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.replaced, vec![first.inserted.id]);

        let rows = store.find_by_user(user).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.is_active()).count(), 1);

        let old = rows.iter().find(|r| r.id == first.inserted.id).unwrap();
        assert_eq!(old.status, SubscriptionStatus::Replaced);
        assert!(old.cancelled_at.is_some());

        let active = store.find_active(user).await.unwrap().unwrap();
        assert_eq!(active.id, second.inserted.id);
        assert_eq!(active.credits_used, 0);
    }

    #[tokio::test]
    async fn transition_requires_expected_status() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();
        let row = store
            .replace_active(request(user, "ch_1"), Utc::now())
            .await
            .unwrap()
            .unwrap()
            .inserted;

        let cancelled = store
            .transition(row.id, StatusChange::cancel())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert!(cancelled.cancel_at_period_end);

        // already cancelled, no longer active
        assert!(
            store
                .transition(row.id, StatusChange::cancel())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let store = MemorySubscriptionStore::new();
        let change = StatusChange {
            from: SubscriptionStatus::Replaced,
            to: SubscriptionStatus::Active,
            cancelled_at: None,
            cancel_at_period_end: None,
        };
        assert!(store.transition(Uuid::new_v4(), change).await.is_err());
    }

    #[tokio::test]
    async fn lookup_by_checkout_id() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();
        store.replace_active(request(user, "ch_9"), Utc::now()).await.unwrap();

        assert!(store.find_by_checkout_id("ch_9").await.unwrap().is_some());
        assert!(store.find_by_checkout_id("ch_missing").await.unwrap().is_none());
        assert!(store.find_active(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recorded_checkout_is_not_applied_again() {
        let store = MemorySubscriptionStore::new();
        let user = Uuid::new_v4();
        let first = store
            .replace_active(request(user, "ch_1"), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let replay = store
            .replace_active(request(user, "ch_1"), Utc::now())
            .await
            .unwrap();
        assert!(replay.is_none());

        let rows = store.all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.inserted.id);
        assert!(rows[0].is_active());
    }

    #[tokio::test]
    async fn concurrent_checkouts_leave_one_active_row() {
        let store = std::sync::Arc::new(MemorySubscriptionStore::new());
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .replace_active(request(user, &format!("ch_{}", i)), Utc::now())
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        let rows = store.all().unwrap();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows.iter().filter(|r| r.is_active()).count(), 1);
        assert_eq!(
            rows.iter()
                .filter(|r| r.status == SubscriptionStatus::Replaced)
                .count(),
            7
        );
    }
}
