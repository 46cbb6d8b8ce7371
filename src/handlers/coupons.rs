use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::coupons::AppliedCouponResponse,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, message = "coupon_code is required"))]
    pub coupon_code: String,
}

/// POST /orders/{id}/coupon: apply a coupon code to a created order.
/// Re-applying replaces the previous coupon; an order holds at most one.
pub async fn apply_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<AppliedCouponResponse>>, ServiceError> {
    request.validate()?;
    let response = state
        .services
        .coupons
        .apply_coupon(auth_user.user_id, order_id, &request.coupon_code)
        .await?;
    Ok(Json(ApiResponse::with_message(
        response,
        "Coupon applied successfully",
    )))
}

/// DELETE /orders/{id}/coupon: remove the applied coupon.
pub async fn remove_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    state
        .services
        .coupons
        .remove_coupon(auth_user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "order_id": order_id }),
        "Coupon removed successfully",
    )))
}
