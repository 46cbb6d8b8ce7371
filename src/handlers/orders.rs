use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::{
        CancelOrderRequest, DateRange, DraftOrderResponse, DraftSavedResponse,
        FinalizedOrderResponse, OrderListResponse, OrderReviewResponse, RescheduleRequest,
        SetDeliveryRequest, SetPickupRequest, SetServiceTypeRequest, UpsertDraftRequest,
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<String>,
    #[serde(default)]
    pub date_range: DateRange,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

/// POST /orders: create or update the caller's draft (wizard step 1).
pub async fn upsert_draft(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpsertDraftRequest>,
) -> Result<Json<ApiResponse<DraftSavedResponse>>, ServiceError> {
    let response = state
        .services
        .orders
        .upsert_draft(auth_user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        response,
        "Order created successfully",
    )))
}

/// GET /orders/draft: resume the in-progress booking wizard.
pub async fn get_draft(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<DraftOrderResponse>>, ServiceError> {
    let draft = state.services.orders.get_draft(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(draft)))
}

/// PUT /orders/{id}/service-type: wizard step 2.
pub async fn set_service_type(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<SetServiceTypeRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let order_id = state
        .services
        .orders
        .set_service_type(auth_user.user_id, order_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "order_id": order_id }),
        "Service type updated successfully",
    )))
}

/// PUT /orders/{id}/pickup: wizard step 3.
pub async fn set_pickup(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<SetPickupRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let pickup_date = request.pickup_date;
    let pickup_slot_id = request.pickup_slot_id;
    let order_id = state
        .services
        .orders
        .set_pickup(auth_user.user_id, order_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({
            "order_id": order_id,
            "pickup_date": pickup_date,
            "pickup_slot_id": pickup_slot_id,
        }),
        "Pickup details updated successfully",
    )))
}

/// PUT /orders/{id}/delivery: wizard step 4.
pub async fn set_delivery(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<SetDeliveryRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let delivery_date = request.delivery_date;
    let delivery_slot_id = request.delivery_slot_id;
    let order_id = state
        .services
        .orders
        .set_delivery(auth_user.user_id, order_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({
            "order_id": order_id,
            "delivery_date": delivery_date,
            "delivery_slot_id": delivery_slot_id,
        }),
        "Delivery details updated successfully",
    )))
}

/// POST /orders/{id}/finalize: wizard step 5, draft becomes created.
pub async fn finalize_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<FinalizedOrderResponse>>, ServiceError> {
    let response = state
        .services
        .orders
        .finalize(auth_user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::with_message(
        response,
        "Order finalized successfully",
    )))
}

/// GET /orders/{id}/review: full breakdown of a created order.
pub async fn review_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderReviewResponse>>, ServiceError> {
    let review = state
        .services
        .orders
        .review(auth_user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(review)))
}

/// POST /orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let order_id = state
        .services
        .orders
        .cancel(auth_user.user_id, order_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "order_id": order_id }),
        "Order cancelled successfully",
    )))
}

/// PUT /orders/{id}/reschedule-pickup
pub async fn reschedule_pickup(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let order_id = state
        .services
        .orders
        .reschedule_pickup(auth_user.user_id, order_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "order_id": order_id }),
        "Pickup rescheduled successfully",
    )))
}

/// PUT /orders/{id}/reschedule-delivery
pub async fn reschedule_delivery(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let order_id = state
        .services
        .orders
        .reschedule_delivery(auth_user.user_id, order_id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "order_id": order_id }),
        "Delivery rescheduled successfully",
    )))
}

/// GET /orders: paginated booked-order history for the caller.
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<OrderStatus>().map_err(|_| {
                ServiceError::ValidationError(format!("Unknown order status: {}", raw))
            })
        })
        .transpose()?;

    let response = state
        .services
        .orders
        .list_orders(
            auth_user.user_id,
            query.page,
            query.limit,
            status,
            query.date_range,
        )
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Fallback for unknown routes under the API prefix.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
