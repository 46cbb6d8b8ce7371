//! Read-only reference data consumed by the booking wizard: services,
//! service types and active time slots.

use axum::{extract::State, response::Json};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::{
    entities::{service, service_type, time_slot},
    errors::ServiceError,
    ApiResponse, AppState,
};

/// GET /services
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<service::Model>>>, ServiceError> {
    let rows = service::Entity::find()
        .filter(service::Column::IsActive.eq(true))
        .order_by_desc(service::Column::Id)
        .all(&*state.db)
        .await?;
    Ok(Json(ApiResponse::with_message(
        rows,
        "Services retrieved successfully",
    )))
}

/// GET /service-types
pub async fn list_service_types(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<service_type::Model>>>, ServiceError> {
    let rows = service_type::Entity::find()
        .order_by_desc(service_type::Column::Id)
        .all(&*state.db)
        .await?;
    Ok(Json(ApiResponse::with_message(
        rows,
        "Service types retrieved successfully",
    )))
}

/// GET /time-slots: active slots only; inactive ones are not bookable.
pub async fn list_time_slots(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<time_slot::Model>>>, ServiceError> {
    let rows = time_slot::Entity::find()
        .filter(time_slot::Column::IsActive.eq(true))
        .order_by_asc(time_slot::Column::StartTime)
        .all(&*state.db)
        .await?;
    Ok(Json(ApiResponse::with_message(
        rows,
        "Time slots retrieved successfully",
    )))
}
