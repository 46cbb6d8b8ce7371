mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use washday_api::{entities::order, errors::ServiceError};

use common::{CouponSpec, TestCtx};

async fn created_order(ctx: &TestCtx, user: Uuid) -> Uuid {
    ctx.seed_address(user).await;
    let (pickup, delivery) = ctx.far_schedule();
    ctx.create_order(user, pickup, delivery).await
}

#[tokio::test]
async fn apply_is_case_insensitive_and_replaces_previous() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    let order_id = created_order(&ctx, user).await;

    let first_id = ctx.seed_coupon(CouponSpec::flat("SAVE50", dec!(50))).await;
    let second_id = ctx
        .seed_coupon(CouponSpec::percentage("TEN", dec!(10)))
        .await;

    let applied = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "save50")
        .await
        .unwrap();
    assert_eq!(applied.coupon_id, first_id);
    assert_eq!(applied.code, "SAVE50");

    // Applying another code swaps the attachment, it does not stack.
    let applied = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "TEN")
        .await
        .unwrap();
    assert_eq!(applied.coupon_id, second_id);

    let stored = order::Entity::find_by_id(order_id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.applied_coupon_id, Some(second_id));
}

#[tokio::test]
async fn apply_requires_created_order() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    ctx.seed_address(user).await;
    ctx.seed_coupon(CouponSpec::flat("SAVE50", dec!(50))).await;

    let draft = ctx
        .services
        .orders
        .upsert_draft(
            user,
            washday_api::services::orders::UpsertDraftRequest {
                service_id: 1,
                clothes_count: 20,
            },
        )
        .await
        .unwrap();

    let err = ctx
        .services
        .coupons
        .apply_coupon(user, draft.order_id, "SAVE50")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn inactive_or_out_of_window_coupons_are_rejected() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    let order_id = created_order(&ctx, user).await;

    ctx.seed_coupon(CouponSpec {
        is_active: false,
        ..CouponSpec::flat("DISABLED", dec!(50))
    })
    .await;
    ctx.seed_coupon(CouponSpec {
        end_date: Some(Utc::now() - Duration::days(1)),
        ..CouponSpec::flat("EXPIRED", dec!(50))
    })
    .await;

    for code in ["DISABLED", "EXPIRED", "NOSUCHCODE"] {
        let err = ctx
            .services
            .coupons
            .apply_coupon(user, order_id, code)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::ValidationError(msg) if msg.contains("Invalid or expired")
        );
    }
}

#[tokio::test]
async fn global_usage_limit_is_enforced() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    let order_id = created_order(&ctx, user).await;

    ctx.seed_coupon(CouponSpec {
        usage_limit: Some(100),
        used_count: 100,
        ..CouponSpec::flat("POPULAR", dec!(50))
    })
    .await;

    let err = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "POPULAR")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("usage limit"));
}

#[tokio::test]
async fn per_user_limit_counts_only_consumed_grants() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    let order_id = created_order(&ctx, user).await;

    let coupon_id = ctx
        .seed_coupon(CouponSpec {
            per_user_limit: Some(1),
            ..CouponSpec::flat("ONCEONLY", dec!(50))
        })
        .await;

    // An unused grant does not count against the per-user limit.
    ctx.seed_coupon_usage(coupon_id, user, false, Utc::now() + Duration::days(10))
        .await;
    ctx.services
        .coupons
        .apply_coupon(user, order_id, "ONCEONLY")
        .await
        .unwrap();

    ctx.seed_coupon_usage(coupon_id, user, true, Utc::now() + Duration::days(10))
        .await;
    let err = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "ONCEONLY")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("already used"));
}

#[tokio::test]
async fn reward_code_requires_a_live_grant() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    let order_id = created_order(&ctx, user).await;

    let reward_id = ctx
        .seed_coupon(CouponSpec::percentage("WELCOMEBACK", dec!(10)))
        .await;

    let err = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "welcomeback")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("not eligible"));

    // An expired grant does not help.
    ctx.seed_coupon_usage(reward_id, user, false, Utc::now() - Duration::days(1))
        .await;
    let err = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "WELCOMEBACK")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    ctx.seed_coupon_usage(reward_id, user, false, Utc::now() + Duration::days(10))
        .await;
    let applied = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "WELCOMEBACK")
        .await
        .unwrap();
    assert_eq!(applied.coupon_id, reward_id);
}

#[tokio::test]
async fn minimum_amount_is_checked_against_estimated_total() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    // Gross total for the standard 20-clothes order is 152.
    let order_id = created_order(&ctx, user).await;

    ctx.seed_coupon(CouponSpec {
        minimum_amount_value: dec!(200),
        ..CouponSpec::flat("BIGORDER", dec!(50))
    })
    .await;
    ctx.seed_coupon(CouponSpec {
        minimum_amount_value: dec!(150),
        ..CouponSpec::flat("SMALLORDER", dec!(50))
    })
    .await;

    let err = ctx
        .services
        .coupons
        .apply_coupon(user, order_id, "BIGORDER")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("at least"));

    ctx.services
        .coupons
        .apply_coupon(user, order_id, "SMALLORDER")
        .await
        .unwrap();
}

#[tokio::test]
async fn remove_clears_the_applied_coupon() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    let order_id = created_order(&ctx, user).await;
    ctx.seed_coupon(CouponSpec::flat("SAVE50", dec!(50))).await;

    ctx.services
        .coupons
        .apply_coupon(user, order_id, "SAVE50")
        .await
        .unwrap();
    ctx.services
        .coupons
        .remove_coupon(user, order_id)
        .await
        .unwrap();

    let stored = order::Entity::find_by_id(order_id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.applied_coupon_id, None);

    let err = ctx
        .services
        .coupons
        .remove_coupon(user, order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("No coupon"));
}

#[tokio::test]
async fn review_reflects_coupon_discount_above_the_floor() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    ctx.seed_address(user).await;

    // 100 clothes: avg weight 55kg * (10 + 2) + flat 20 = 680 gross.
    let orders = &ctx.services.orders;
    let draft = orders
        .upsert_draft(
            user,
            washday_api::services::orders::UpsertDraftRequest {
                service_id: 1,
                clothes_count: 100,
            },
        )
        .await
        .unwrap();
    let order_id = draft.order_id;
    let (pickup, delivery) = ctx.far_schedule();
    orders
        .set_service_type(
            user,
            order_id,
            washday_api::services::orders::SetServiceTypeRequest { service_type_id: 1 },
        )
        .await
        .unwrap();
    orders
        .set_pickup(
            user,
            order_id,
            washday_api::services::orders::SetPickupRequest {
                pickup_date: pickup.0,
                pickup_slot_id: pickup.1,
            },
        )
        .await
        .unwrap();
    orders
        .set_delivery(
            user,
            order_id,
            washday_api::services::orders::SetDeliveryRequest {
                delivery_date: delivery.0,
                delivery_slot_id: delivery.1,
            },
        )
        .await
        .unwrap();
    orders.finalize(user, order_id).await.unwrap();

    ctx.seed_coupon(CouponSpec::percentage("TEN", dec!(10))).await;
    ctx.services
        .coupons
        .apply_coupon(user, order_id, "TEN")
        .await
        .unwrap();

    let review = orders.review(user, order_id).await.unwrap();
    let pricing = &review.pricing_breakdown;

    assert_eq!(review.applied_coupon.as_deref(), Some("TEN"));
    assert_eq!(pricing.service_charge, "550.00");
    assert_eq!(pricing.flat_fee, "20.00");
    // 10% of 680 gross.
    assert_eq!(pricing.discount, "68.00");
    assert_eq!(pricing.approx_total, "612.00");
    assert_eq!(pricing.advance_payment, "500.00");
    assert_eq!(pricing.remaining_payment, "112.00");
}
