//! Coupon eligibility and application.
//!
//! Apply/remove both run inside a transaction that locks the order row, so
//! two concurrent applies serialize instead of racing; at most one coupon is
//! ever attached to an order.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::coupon::{self, Entity as CouponEntity},
    entities::coupon_usage::{self, Entity as CouponUsageEntity},
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct AppliedCouponResponse {
    pub order_id: Uuid,
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_type: coupon::DiscountType,
    pub discount_value: rust_decimal::Decimal,
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    reward_code: String,
    reward_validity_days: i64,
}

impl CouponService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        reward_code: String,
        reward_validity_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            reward_code,
            reward_validity_days,
        }
    }

    fn is_reward_code(&self, code: &str) -> bool {
        code.eq_ignore_ascii_case(&self.reward_code)
    }

    /// Applies a coupon to a created order, replacing any prior one.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id, code = %code))]
    pub async fn apply_coupon(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        code: &str,
    ) -> Result<AppliedCouponResponse, ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "coupon_code is required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order = lock_created_order(&txn, order_id, user_id).await?;
        let coupon = self.eligible_coupon(&txn, &order, user_id, code).await?;

        let coupon_id = coupon.id;
        let response = AppliedCouponResponse {
            order_id,
            coupon_id,
            code: coupon.code.clone(),
            discount_type: coupon.discount_type.clone(),
            discount_value: coupon.discount_value,
        };

        let mut active: order::ActiveModel = order.into();
        active.applied_coupon_id = Set(Some(coupon_id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, coupon_id = %coupon_id, "Coupon applied to order");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::CouponApplied { order_id, coupon_id }).await {
                warn!(error = %e, order_id = %order_id, "Failed to send coupon applied event");
            }
        }

        Ok(response)
    }

    /// Clears the applied coupon from a created order.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn remove_coupon(&self, user_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let order = lock_created_order(&txn, order_id, user_id).await?;

        if order.applied_coupon_id.is_none() {
            return Err(ServiceError::ValidationError(
                "No coupon applied to this order".to_string(),
            ));
        }

        let mut active: order::ActiveModel = order.into();
        active.applied_coupon_id = Set(None);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, "Coupon removed from order");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::CouponRemoved(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send coupon removed event");
            }
        }

        Ok(())
    }

    /// Runs the full eligibility protocol for `code` against an order and the
    /// caller's redemption history. Check order matters: restricted-grant
    /// possession is decided before any shared limit.
    async fn eligible_coupon<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        user_id: Uuid,
        code: &str,
    ) -> Result<coupon::Model, ServiceError> {
        let now = Utc::now();

        let coupon = CouponEntity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(coupon::Column::Code)))
                    .eq(code.to_lowercase()),
            )
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::StartDate.lte(now))
            .filter(coupon::Column::EndDate.gte(now))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("Invalid or expired coupon".to_string())
            })?;

        if self.is_reward_code(&coupon.code) {
            let grant = CouponUsageEntity::find()
                .filter(coupon_usage::Column::CouponId.eq(coupon.id))
                .filter(coupon_usage::Column::UserId.eq(user_id))
                .filter(coupon_usage::Column::IsUsed.eq(false))
                .filter(coupon_usage::Column::ExpiryDate.gte(now))
                .one(conn)
                .await?;

            if grant.is_none() {
                return Err(ServiceError::ValidationError(
                    "You are not eligible for this coupon".to_string(),
                ));
            }
        }

        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                return Err(ServiceError::ValidationError(
                    "Coupon usage limit reached".to_string(),
                ));
            }
        }

        if let Some(per_user_limit) = coupon.per_user_limit {
            let used = CouponUsageEntity::find()
                .filter(coupon_usage::Column::CouponId.eq(coupon.id))
                .filter(coupon_usage::Column::UserId.eq(user_id))
                .filter(coupon_usage::Column::IsUsed.eq(true))
                .count(conn)
                .await?;

            if used >= per_user_limit as u64 {
                return Err(ServiceError::ValidationError(
                    "You have already used this coupon".to_string(),
                ));
            }
        }

        if let Some(gross_total) = order.estimated_total {
            if gross_total < coupon.minimum_amount_value {
                return Err(ServiceError::ValidationError(format!(
                    "Order total must be at least {} to use this coupon",
                    coupon.minimum_amount_value
                )));
            }
        }

        Ok(coupon)
    }

    /// Grants the restricted reward coupon to a user after a cancellation.
    ///
    /// No-op when the user already holds an unexpired unused grant, or when
    /// the configured reward coupon does not exist. Callers treat failure as
    /// best-effort (logged, never propagated into the cancel result).
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn grant_reward(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        let now = Utc::now();

        let coupon = CouponEntity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(coupon::Column::Code)))
                    .eq(self.reward_code.to_lowercase()),
            )
            .one(&*self.db)
            .await?;

        let Some(coupon) = coupon else {
            warn!(code = %self.reward_code, "Reward coupon not configured in store; skipping grant");
            return Ok(None);
        };

        let existing = CouponUsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .filter(coupon_usage::Column::IsUsed.eq(false))
            .filter(coupon_usage::Column::ExpiryDate.gte(now))
            .one(&*self.db)
            .await?;

        if existing.is_some() {
            info!(user_id = %user_id, "User already holds an unused reward grant");
            return Ok(None);
        }

        let grant = coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            user_id: Set(user_id),
            is_used: Set(false),
            expiry_date: Set(now + chrono::Duration::days(self.reward_validity_days)),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let grant = grant.insert(&*self.db).await?;

        info!(user_id = %user_id, coupon_id = %coupon.id, "Reward coupon granted");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::RewardCouponGranted {
                    user_id,
                    coupon_id: coupon.id,
                })
                .await
            {
                warn!(error = %e, user_id = %user_id, "Failed to send reward granted event");
            }
        }

        Ok(Some(grant.id))
    }
}

/// Re-fetches and row-locks an order scoped to (id, owner, Created) so the
/// surrounding transaction serializes concurrent mutations.
pub(crate) async fn lock_created_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    user_id: Uuid,
) -> Result<order::Model, ServiceError> {
    OrderEntity::find()
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::Status.eq(OrderStatus::Created))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Created order not found".to_string()))
}
