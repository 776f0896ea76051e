use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    dtos::subscription::{StatusChange, SubscriptionCreateRequest},
    models::subscription::{Subscription, SubscriptionStatus},
};

/// Transaction-scoped advisory lock on the user's subscriptions, released on
/// commit or rollback.
pub async fn lock_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(user_id)
        .execute(executor)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

pub async fn get_active_subscription_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        SELECT * FROM subscriptions
        WHERE user_id = $1 AND status = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(SubscriptionStatus::Active)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_subscriptions_by_user_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_subscription_by_checkout_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    checkout_id: &str,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE creem_checkout_id = $1 LIMIT 1",
    )
    .bind(checkout_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SubscriptionCreateRequest,
) -> Res<Subscription> {
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (
            user_id, creem_subscription_id, creem_customer_id, creem_checkout_id,
            plan_name, plan_type, product_id, amount, currency, status,
            current_period_start, current_period_end, cancel_at_period_end,
            credits_total, credits_used, metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, $13, 0, $14)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.creem_subscription_id)
    .bind(data.creem_customer_id)
    .bind(data.creem_checkout_id)
    .bind(data.plan_name)
    .bind(data.plan_type)
    .bind(data.product_id)
    .bind(data.amount)
    .bind(data.currency)
    .bind(SubscriptionStatus::Active)
    .bind(data.current_period_start)
    .bind(data.current_period_end)
    .bind(data.credits_total)
    .bind(data.metadata)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Applies `change` to one row if it is still in `change.from`.
pub async fn update_subscription_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    id: Uuid,
    change: StatusChange,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET status = $3,
            cancelled_at = COALESCE($4, cancelled_at),
            cancel_at_period_end = COALESCE($5, cancel_at_period_end),
            updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(change.from)
    .bind(change.to)
    .bind(change.cancelled_at)
    .bind(change.cancel_at_period_end)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Applies `change` to every row of the user still in `change.from`.
/// Returns the ids of the updated rows.
pub async fn update_user_subscriptions_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    change: StatusChange,
) -> Res<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE subscriptions
        SET status = $3,
            cancelled_at = COALESCE($4, cancelled_at),
            cancel_at_period_end = COALESCE($5, cancel_at_period_end),
            updated_at = now()
        WHERE user_id = $1 AND status = $2
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(change.from)
    .bind(change.to)
    .bind(change.cancelled_at)
    .bind(change.cancel_at_period_end)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}
