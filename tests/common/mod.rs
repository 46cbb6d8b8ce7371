//! Test harness: application state backed by an in-memory SQLite database
//! with the schema created from the entity definitions.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use washday_api::{
    api_v1_routes, auth,
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{
        coupon::{self, DiscountType},
        coupon_usage, payment, service, service_type, time_slot, user_address,
    },
    events::{self, EventSender},
    services::{
        orders::{
            SetDeliveryRequest, SetPickupRequest, SetServiceTypeRequest, UpsertDraftRequest,
        },
        AppServices,
    },
    AppState,
};

pub struct TestCtx {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub config: AppConfig,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestCtx {
    pub async fn new() -> Self {
        let config = AppConfig::new(
            "sqlite::memory:".to_string(),
            "integration-test-secret-key-0123456789abcdef".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );

        // In-memory SQLite must stay on a single connection or each pooled
        // connection would see its own empty database.
        let db_config = DbConfig {
            url: config.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("failed to open test database");
        db::create_schema(&pool)
            .await
            .expect("failed to create schema");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let services = AppServices::new(
            db.clone(),
            Some(Arc::new(EventSender::new(event_tx))),
            &config,
        );

        Self {
            db,
            services,
            config,
            _event_task: event_task,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            config: self.config.clone(),
            services: self.services.clone(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(self.app_state())
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        auth::issue_token(user_id, &["customer"], &self.config.jwt_secret, 3600)
            .expect("failed to issue test token")
    }

    /// Sends a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize request body"))
        } else {
            Body::empty()
        };
        let request = builder.body(body).expect("failed to build request");
        self.router()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Drives the wizard for `user_id` to a finalized (Created) order.
    ///
    /// `seed_reference` and a selected address must already be in place.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        pickup: (NaiveDate, i32),
        delivery: (NaiveDate, i32),
    ) -> Uuid {
        let orders = &self.services.orders;
        let draft = orders
            .upsert_draft(
                user_id,
                UpsertDraftRequest {
                    service_id: 1,
                    clothes_count: 20,
                },
            )
            .await
            .expect("draft creation failed");
        let order_id = draft.order_id;

        orders
            .set_service_type(user_id, order_id, SetServiceTypeRequest { service_type_id: 1 })
            .await
            .expect("set_service_type failed");
        orders
            .set_pickup(
                user_id,
                order_id,
                SetPickupRequest {
                    pickup_date: pickup.0,
                    pickup_slot_id: pickup.1,
                },
            )
            .await
            .expect("set_pickup failed");
        orders
            .set_delivery(
                user_id,
                order_id,
                SetDeliveryRequest {
                    delivery_date: delivery.0,
                    delivery_slot_id: delivery.1,
                },
            )
            .await
            .expect("set_delivery failed");
        orders
            .finalize(user_id, order_id)
            .await
            .expect("finalize failed");
        order_id
    }

    /// Default schedule far from the reschedule/cancel cutoff: pickup in
    /// five days, delivery two days after that, both in the morning slot.
    pub fn far_schedule(&self) -> ((NaiveDate, i32), (NaiveDate, i32)) {
        let today = Utc::now().date_naive();
        ((today + Duration::days(5), 1), (today + Duration::days(7), 1))
    }

    /// Standard reference data: one service (10/kg), one 24h service type
    /// (+2/kg, flat 20), a morning slot, a peak evening slot and an
    /// inactive slot.
    pub async fn seed_reference(&self) {
        service::ActiveModel {
            id: Set(1),
            name: Set("Wash & Fold".to_string()),
            base_price_per_kg: Set(dec!(10)),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .unwrap();

        service_type::ActiveModel {
            id: Set(1),
            service_id: Set(1),
            name: Set("Standard".to_string()),
            delivery_hours: Set(24),
            extra_price_per_kg: Set(dec!(2)),
            flat_fee: Set(dec!(20)),
        }
        .insert(&*self.db)
        .await
        .unwrap();

        self.seed_slot(1, NaiveTime::from_hms_opt(9, 0, 0).unwrap(), true, false, Decimal::ZERO)
            .await;
        self.seed_slot(2, NaiveTime::from_hms_opt(18, 0, 0).unwrap(), true, true, dec!(50))
            .await;
        self.seed_slot(3, NaiveTime::from_hms_opt(12, 0, 0).unwrap(), false, false, Decimal::ZERO)
            .await;
    }

    pub async fn seed_slot(
        &self,
        id: i32,
        start: NaiveTime,
        active: bool,
        peak: bool,
        peak_extra_charge: Decimal,
    ) {
        time_slot::ActiveModel {
            id: Set(id),
            start_time: Set(start),
            end_time: Set(start + Duration::hours(2)),
            is_active: Set(active),
            is_peak: Set(peak),
            peak_extra_charge: Set(peak_extra_charge),
        }
        .insert(&*self.db)
        .await
        .unwrap();
    }

    /// Seeds a slot starting at `now + offset`, returning (slot_id, date)
    /// ready to book so schedule-cutoff scenarios are reproducible.
    pub async fn seed_slot_from_now(
        &self,
        id: i32,
        offset: Duration,
    ) -> (i32, chrono::NaiveDate) {
        let at = Utc::now().naive_utc() + offset;
        self.seed_slot(id, at.time(), true, false, Decimal::ZERO).await;
        (id, at.date())
    }

    pub async fn seed_address(&self, user_id: Uuid) -> i32 {
        static NEXT: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(1);
        let id = NEXT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        user_address::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            complete_address: Set("42 Spin Cycle Road, Laundry District".to_string()),
            is_selected: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap();
        id
    }

    pub async fn seed_coupon(&self, spec: CouponSpec) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        coupon::ActiveModel {
            id: Set(id),
            code: Set(spec.code),
            discount_type: Set(spec.discount_type),
            discount_value: Set(spec.discount_value),
            minimum_amount_value: Set(spec.minimum_amount_value),
            start_date: Set(spec.start_date.unwrap_or(now - Duration::days(1))),
            end_date: Set(spec.end_date.unwrap_or(now + Duration::days(30))),
            is_active: Set(spec.is_active),
            usage_limit: Set(spec.usage_limit),
            per_user_limit: Set(spec.per_user_limit),
            used_count: Set(spec.used_count),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .unwrap();
        id
    }

    pub async fn seed_coupon_usage(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        is_used: bool,
        expiry: DateTime<Utc>,
    ) {
        coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon_id),
            user_id: Set(user_id),
            is_used: Set(is_used),
            expiry_date: Set(expiry),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .unwrap();
    }

    pub async fn seed_advance_payment(&self, order_id: Uuid) {
        payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            payment_type: Set(payment::PaymentType::Advance),
            status: Set(payment::PaymentStatus::Success),
            amount: Set(dec!(500)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap();
    }
}

pub struct CouponSpec {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_amount_value: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub used_count: i32,
}

impl CouponSpec {
    pub fn flat(code: &str, value: Decimal) -> Self {
        Self {
            code: code.to_string(),
            discount_type: DiscountType::Flat,
            discount_value: value,
            minimum_amount_value: Decimal::ZERO,
            start_date: None,
            end_date: None,
            is_active: true,
            usage_limit: None,
            per_user_limit: None,
            used_count: 0,
        }
    }

    pub fn percentage(code: &str, value: Decimal) -> Self {
        Self {
            discount_type: DiscountType::Percentage,
            ..Self::flat(code, value)
        }
    }
}
