//! washday-api
//!
//! Order lifecycle and pricing engine for a laundry pickup/delivery service:
//! a draft-to-finalized order state machine with slot validation, coupon
//! eligibility and discount computation, and time-window-gated
//! reschedule/cancel rules.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: services::AppServices,
}

/// Common response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

/// Standard API result type for JSON responses.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Builds the versioned API router.
pub fn api_v1_routes() -> Router<AppState> {
    let orders = Router::new()
        .route("/orders", post(handlers::orders::upsert_draft))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/draft", get(handlers::orders::get_draft))
        .route(
            "/orders/:id/service-type",
            put(handlers::orders::set_service_type),
        )
        .route("/orders/:id/pickup", put(handlers::orders::set_pickup))
        .route("/orders/:id/delivery", put(handlers::orders::set_delivery))
        .route(
            "/orders/:id/finalize",
            post(handlers::orders::finalize_order),
        )
        .route("/orders/:id/review", get(handlers::orders::review_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route(
            "/orders/:id/reschedule-pickup",
            put(handlers::orders::reschedule_pickup),
        )
        .route(
            "/orders/:id/reschedule-delivery",
            put(handlers::orders::reschedule_delivery),
        )
        .route("/orders/:id/coupon", post(handlers::coupons::apply_coupon))
        .route(
            "/orders/:id/coupon",
            delete(handlers::coupons::remove_coupon),
        );

    let reference = Router::new()
        .route("/services", get(handlers::reference::list_services))
        .route(
            "/service-types",
            get(handlers::reference::list_service_types),
        )
        .route("/time-slots", get(handlers::reference::list_time_slots));

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(orders)
        .merge(reference)
        .fallback(handlers::orders::not_found)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "washday-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(ApiResponse::success(health_data)))
}
