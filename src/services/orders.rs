//! The order state machine: draft -> created -> cancelled.
//!
//! Every mutating transition opens a transaction, re-fetches the order with
//! a row lock scoped to (id, user, required status), runs all checks, and
//! only then writes. Any failure rolls the whole transaction back, so a
//! partially-updated order is never observable.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_cancellation::{self, CancellationReason},
    entities::payment::{self, Entity as PaymentEntity, PaymentStatus, PaymentType},
    entities::service::Entity as ServiceEntity,
    entities::service_type::Entity as ServiceTypeEntity,
    entities::time_slot::Entity as TimeSlotEntity,
    entities::user_address::{self, Entity as UserAddressEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::coupons::{lock_created_order, CouponService},
    services::pricing::{self, CouponTerms, PriceBreakdownDisplay, PricingInputs},
    services::scheduling,
};

const MIN_CLOTHES_COUNT: i32 = 10;

// ---------------------------------------------------------------------------
// Request/response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UpsertDraftRequest {
    pub service_id: i32,
    pub clothes_count: i32,
}

#[derive(Debug, Serialize)]
pub struct DraftSavedResponse {
    pub order_id: Uuid,
    pub estimated_weight_min: Decimal,
    pub estimated_weight_max: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DraftOrderResponse {
    pub order_id: Uuid,
    pub service_id: i32,
    pub service_type_id: Option<i32>,
    pub clothes_count: i32,
    pub estimated_weight_min: Decimal,
    pub estimated_weight_max: Decimal,
    pub address_id: Option<i32>,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_slot_id: Option<i32>,
    pub delivery_date: Option<NaiveDate>,
    pub delivery_slot_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SetServiceTypeRequest {
    pub service_type_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetPickupRequest {
    pub pickup_date: NaiveDate,
    pub pickup_slot_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetDeliveryRequest {
    pub delivery_date: NaiveDate,
    pub delivery_slot_id: i32,
}

#[derive(Debug, Serialize)]
pub struct FinalizedOrderResponse {
    pub order_id: Uuid,
    pub estimated_total: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: CancellationReason,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub slot_id: i32,
}

#[derive(Debug, Serialize)]
pub struct ServiceDetails {
    pub service_name: String,
    pub service_type: String,
    pub clothes_count: i32,
    pub estimated_weight_range: String,
}

#[derive(Debug, Serialize)]
pub struct ScheduleWindow {
    pub date: NaiveDate,
    pub slot: String,
}

#[derive(Debug, Serialize)]
pub struct Schedule {
    pub pickup: ScheduleWindow,
    pub delivery: ScheduleWindow,
}

#[derive(Debug, Serialize)]
pub struct OrderReviewResponse {
    pub order_id: Uuid,
    pub service_details: ServiceDetails,
    pub schedule: Schedule,
    pub address: Option<String>,
    pub applied_coupon: Option<String>,
    pub pricing_breakdown: PriceBreakdownDisplay,
}

/// Creation-time window filter for order listing.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    // rename_all would fold the digits into the preceding word
    // (`last7_days`), so the numbered variants spell their tokens out.
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "last_6_months")]
    Last6Months,
    LastYear,
    #[default]
    Anytime,
}

impl DateRange {
    fn cutoff(self, now: chrono::DateTime<Utc>) -> Option<chrono::DateTime<Utc>> {
        match self {
            DateRange::Last7Days => Some(now - Duration::days(7)),
            DateRange::Last30Days => Some(now - Duration::days(30)),
            DateRange::Last6Months => Some(now - Duration::days(183)),
            DateRange::LastYear => Some(now - Duration::days(365)),
            DateRange::Anytime => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub clothes_count: i32,
    pub estimated_weight_min: Decimal,
    pub estimated_weight_max: Decimal,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub estimated_total: Option<Decimal>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderSummary>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    coupons: Arc<CouponService>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        coupons: Arc<CouponService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            coupons,
        }
    }

    /// Step 1: create or update the caller's draft order.
    ///
    /// Idempotent upsert: a user has at most one draft at a time, so an
    /// existing draft is updated in place.
    #[instrument(skip(self, request), fields(user_id = %user_id, clothes_count = request.clothes_count))]
    pub async fn upsert_draft(
        &self,
        user_id: Uuid,
        request: UpsertDraftRequest,
    ) -> Result<DraftSavedResponse, ServiceError> {
        if request.clothes_count < MIN_CLOTHES_COUNT {
            return Err(ServiceError::ValidationError(
                "Minimum 10 clothes required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let address = UserAddressEntity::find()
            .filter(user_address::Column::UserId.eq(user_id))
            .filter(user_address::Column::IsSelected.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("Please select a delivery address".to_string())
            })?;

        ServiceEntity::find_by_id(request.service_id)
            .filter(crate::entities::service::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Invalid service".to_string()))?;

        let (weight_min, weight_max) = pricing::estimate_weight_range(request.clothes_count);
        let now = Utc::now();

        let existing = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.eq(OrderStatus::Draft))
            .lock_exclusive()
            .one(&txn)
            .await?;

        let order_id = match existing {
            Some(draft) => {
                let id = draft.id;
                // Changing the service invalidates a previously chosen type.
                let service_changed = draft.service_id != request.service_id;
                let mut active: order::ActiveModel = draft.into();
                if service_changed {
                    active.service_type_id = Set(None);
                }
                active.service_id = Set(request.service_id);
                active.clothes_count = Set(request.clothes_count);
                active.estimated_weight_min = Set(weight_min);
                active.estimated_weight_max = Set(weight_max);
                active.address_id = Set(Some(address.id));
                active.updated_at = Set(Some(now));
                active.update(&txn).await?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                let draft = order::ActiveModel {
                    id: Set(id),
                    user_id: Set(user_id),
                    status: Set(OrderStatus::Draft),
                    service_id: Set(request.service_id),
                    service_type_id: Set(None),
                    clothes_count: Set(request.clothes_count),
                    estimated_weight_min: Set(weight_min),
                    estimated_weight_max: Set(weight_max),
                    address_id: Set(Some(address.id)),
                    pickup_date: Set(None),
                    pickup_slot_id: Set(None),
                    delivery_date: Set(None),
                    delivery_slot_id: Set(None),
                    applied_coupon_id: Set(None),
                    base_price_per_kg: Set(None),
                    extra_price_per_kg: Set(None),
                    flat_fee: Set(None),
                    peak_extra_charge: Set(None),
                    estimated_total: Set(None),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                draft.insert(&txn).await?;
                id
            }
        };

        txn.commit().await?;

        info!(order_id = %order_id, "Draft order saved");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::DraftSaved(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send draft saved event");
            }
        }

        Ok(DraftSavedResponse {
            order_id,
            estimated_weight_min: weight_min,
            estimated_weight_max: weight_max,
        })
    }

    /// Returns the caller's in-progress draft so a client can resume the
    /// booking wizard.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_draft(&self, user_id: Uuid) -> Result<DraftOrderResponse, ServiceError> {
        let draft = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.eq(OrderStatus::Draft))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Draft order not found".to_string()))?;

        Ok(DraftOrderResponse {
            order_id: draft.id,
            service_id: draft.service_id,
            service_type_id: draft.service_type_id,
            clothes_count: draft.clothes_count,
            estimated_weight_min: draft.estimated_weight_min,
            estimated_weight_max: draft.estimated_weight_max,
            address_id: draft.address_id,
            pickup_date: draft.pickup_date,
            pickup_slot_id: draft.pickup_slot_id,
            delivery_date: draft.delivery_date,
            delivery_slot_id: draft.delivery_slot_id,
        })
    }

    /// Step 2: choose the service type for the draft.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn set_service_type(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: SetServiceTypeRequest,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;

        let draft = lock_draft_order(&txn, order_id, user_id).await?;

        let service_type = ServiceTypeEntity::find_by_id(request.service_type_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Invalid service type".to_string()))?;

        if service_type.service_id != draft.service_id {
            return Err(ServiceError::ValidationError(
                "Service type does not belong to the selected service".to_string(),
            ));
        }

        let mut active: order::ActiveModel = draft.into();
        active.service_type_id = Set(Some(service_type.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, service_type_id = request.service_type_id, "Service type updated");
        Ok(order_id)
    }

    /// Step 3: book the pickup window.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn set_pickup(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: SetPickupRequest,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;

        let draft = lock_draft_order(&txn, order_id, user_id).await?;

        let slot = scheduling::active_slot(&txn, request.pickup_slot_id).await?;
        let pickup_at = scheduling::combine(request.pickup_date, slot.start_time);
        if pickup_at < Utc::now().naive_utc() {
            return Err(ServiceError::ValidationError(
                "Pickup time is in the past".to_string(),
            ));
        }

        let mut active: order::ActiveModel = draft.into();
        active.pickup_date = Set(Some(request.pickup_date));
        active.pickup_slot_id = Set(Some(slot.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, pickup_date = %request.pickup_date, "Pickup details updated");
        Ok(order_id)
    }

    /// Step 4: book the delivery window. Delivery must be at least the
    /// service type's gap after pickup.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn set_delivery(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: SetDeliveryRequest,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;

        let draft = lock_draft_order(&txn, order_id, user_id).await?;

        let (Some(pickup_date), Some(pickup_slot_id), Some(service_type_id)) =
            (draft.pickup_date, draft.pickup_slot_id, draft.service_type_id)
        else {
            return Err(ServiceError::NotFound(
                "Draft order not found or pickup not selected".to_string(),
            ));
        };

        let pickup_slot = TimeSlotEntity::find_by_id(pickup_slot_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Booked pickup slot missing".to_string()))?;

        let service_type = ServiceTypeEntity::find_by_id(service_type_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Service type missing".to_string()))?;

        let delivery_slot = scheduling::active_slot(&txn, request.delivery_slot_id).await?;

        let pickup_at = scheduling::combine(pickup_date, pickup_slot.start_time);
        let delivery_at = scheduling::combine(request.delivery_date, delivery_slot.start_time);
        let earliest = scheduling::earliest_delivery(pickup_at, service_type.delivery_hours);

        if delivery_at < earliest {
            return Err(ServiceError::ValidationError(format!(
                "Delivery must be at least {} hours after pickup; earliest allowed delivery date is {}",
                service_type.delivery_hours,
                earliest.date()
            )));
        }

        let mut active: order::ActiveModel = draft.into();
        active.delivery_date = Set(Some(request.delivery_date));
        active.delivery_slot_id = Set(Some(delivery_slot.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, delivery_date = %request.delivery_date, "Delivery details updated");
        Ok(order_id)
    }

    /// Step 5: finalize the draft. Snapshots current reference prices onto
    /// the order and moves it to `created`.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn finalize(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<FinalizedOrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let draft = lock_draft_order(&txn, order_id, user_id).await?;

        let (Some(service_type_id), Some(_), Some(_), Some(_)) = (
            draft.service_type_id,
            draft.pickup_date,
            draft.delivery_date,
            draft.address_id,
        ) else {
            return Err(ServiceError::ValidationError(
                "Please complete all steps before finalizing".to_string(),
            ));
        };

        let service = ServiceEntity::find_by_id(draft.service_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Service missing".to_string()))?;

        let service_type = ServiceTypeEntity::find_by_id(service_type_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Service type missing".to_string()))?;

        let pickup_slot = match draft.pickup_slot_id {
            Some(slot_id) => TimeSlotEntity::find_by_id(slot_id).one(&txn).await?,
            None => None,
        };

        let (is_peak, peak_extra_charge) = pickup_slot
            .map(|slot| (slot.is_peak, slot.peak_extra_charge))
            .unwrap_or((false, Decimal::ZERO));
        let peak_charge = if is_peak { peak_extra_charge } else { Decimal::ZERO };

        let breakdown = pricing::compute(&PricingInputs {
            estimated_weight_min: draft.estimated_weight_min,
            estimated_weight_max: draft.estimated_weight_max,
            base_price_per_kg: service.base_price_per_kg,
            extra_price_per_kg: service_type.extra_price_per_kg,
            flat_fee: service_type.flat_fee,
            pickup_is_peak: is_peak,
            peak_extra_charge,
            coupon: None,
        });

        // The stored estimate is the gross total; discounts and the advance
        // floor are presentation-time concerns handled at review.
        let estimated_total = breakdown.gross_total;

        let mut active: order::ActiveModel = draft.into();
        active.status = Set(OrderStatus::Created);
        active.base_price_per_kg = Set(Some(service.base_price_per_kg));
        active.extra_price_per_kg = Set(Some(service_type.extra_price_per_kg));
        active.flat_fee = Set(Some(service_type.flat_fee));
        active.peak_extra_charge = Set(Some(peak_charge));
        active.estimated_total = Set(Some(estimated_total));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        let rendered_total = format!("{:.2}", estimated_total);
        info!(order_id = %order_id, estimated_total = %rendered_total, "Order finalized");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderFinalized {
                    order_id,
                    estimated_total: rendered_total.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order finalized event");
            }
        }

        Ok(FinalizedOrderResponse {
            order_id,
            estimated_total: rendered_total,
        })
    }

    /// Read-only review of a created order: joined details plus the full
    /// pricing breakdown including any applied coupon.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn review(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderReviewResponse, ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.eq(OrderStatus::Created))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Created order not found".to_string()))?;

        let service = ServiceEntity::find_by_id(order.service_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Service missing".to_string()))?;

        let service_type = match order.service_type_id {
            Some(id) => ServiceTypeEntity::find_by_id(id).one(db).await?,
            None => None,
        }
        .ok_or_else(|| ServiceError::InternalError("Service type missing".to_string()))?;

        let pickup_slot = match order.pickup_slot_id {
            Some(id) => TimeSlotEntity::find_by_id(id).one(db).await?,
            None => None,
        }
        .ok_or_else(|| ServiceError::InternalError("Pickup slot missing".to_string()))?;

        let delivery_slot = match order.delivery_slot_id {
            Some(id) => TimeSlotEntity::find_by_id(id).one(db).await?,
            None => None,
        }
        .ok_or_else(|| ServiceError::InternalError("Delivery slot missing".to_string()))?;

        let address = match order.address_id {
            Some(id) => UserAddressEntity::find_by_id(id)
                .one(db)
                .await?
                .map(|a| a.complete_address),
            None => None,
        };

        let coupon = match order.applied_coupon_id {
            Some(id) => {
                crate::entities::coupon::Entity::find_by_id(id)
                    .one(db)
                    .await?
            }
            None => None,
        };

        let peak_charge = order.peak_extra_charge.unwrap_or(Decimal::ZERO);
        let breakdown = pricing::compute(&PricingInputs {
            estimated_weight_min: order.estimated_weight_min,
            estimated_weight_max: order.estimated_weight_max,
            base_price_per_kg: order.base_price_per_kg.unwrap_or(Decimal::ZERO),
            extra_price_per_kg: order.extra_price_per_kg.unwrap_or(Decimal::ZERO),
            flat_fee: order.flat_fee.unwrap_or(Decimal::ZERO),
            pickup_is_peak: peak_charge > Decimal::ZERO,
            peak_extra_charge: peak_charge,
            coupon: coupon.as_ref().map(|c| CouponTerms {
                discount_type: c.discount_type.clone(),
                discount_value: c.discount_value,
                minimum_amount_value: c.minimum_amount_value,
            }),
        });

        let (Some(pickup_date), Some(delivery_date)) = (order.pickup_date, order.delivery_date)
        else {
            return Err(ServiceError::InternalError(
                "Created order missing schedule".to_string(),
            ));
        };

        Ok(OrderReviewResponse {
            order_id,
            service_details: ServiceDetails {
                service_name: service.name,
                service_type: service_type.name,
                clothes_count: order.clothes_count,
                estimated_weight_range: format!(
                    "{} - {} kg",
                    order.estimated_weight_min, order.estimated_weight_max
                ),
            },
            schedule: Schedule {
                pickup: ScheduleWindow {
                    date: pickup_date,
                    slot: format!("{} - {}", pickup_slot.start_time, pickup_slot.end_time),
                },
                delivery: ScheduleWindow {
                    date: delivery_date,
                    slot: format!("{} - {}", delivery_slot.start_time, delivery_slot.end_time),
                },
            },
            address,
            applied_coupon: coupon.map(|c| c.code),
            pricing_breakdown: breakdown.display(),
        })
    }

    /// Cancels a created order. Only allowed at least 12 hours before the
    /// scheduled pickup; records the reason and, after commit, grants the
    /// reward coupon best-effort.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %order_id, reason = %request.reason))]
    pub async fn cancel(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: CancelOrderRequest,
    ) -> Result<Uuid, ServiceError> {
        let description = request
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        if request.reason == CancellationReason::Other && description.is_none() {
            return Err(ServiceError::ValidationError(
                "Please describe your cancellation reason".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order = lock_created_order(&txn, order_id, user_id).await?;
        let pickup_at = scheduled_pickup(&txn, &order).await?;
        let now = Utc::now();

        if !scheduling::outside_cutoff(pickup_at, now.naive_utc()) {
            return Err(ServiceError::ValidationError(
                "Orders can only be cancelled at least 12 hours before pickup".to_string(),
            ));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Some(now));
        active.update(&txn).await?;

        let cancellation = order_cancellation::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            reason: Set(request.reason.clone()),
            description: Set(description),
            cancelled_at: Set(now),
        };
        cancellation.insert(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, reason = %request.reason, "Order cancelled");

        // Reward grant is a secondary side effect: it runs after the commit
        // and its failure must never surface as a cancel failure.
        if let Err(e) = self.coupons.grant_reward(user_id).await {
            warn!(error = %e, user_id = %user_id, "Reward coupon grant failed after cancellation");
        }

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderCancelled {
                    order_id,
                    reason: request.reason,
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order cancelled event");
            }
        }

        Ok(order_id)
    }

    /// Moves the pickup of a paid, created order to a new date/slot. The
    /// cutoff is measured against the currently scheduled pickup, not the
    /// requested one.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn reschedule_pickup(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: RescheduleRequest,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;

        let order = lock_created_order(&txn, order_id, user_id).await?;
        require_advance_paid(&txn, order_id).await?;

        let current_pickup = scheduled_pickup(&txn, &order).await?;
        let now = Utc::now().naive_utc();
        if !scheduling::outside_cutoff(current_pickup, now) {
            return Err(ServiceError::ValidationError(
                "Pickup can only be rescheduled at least 12 hours before the current pickup"
                    .to_string(),
            ));
        }

        let new_slot = scheduling::active_slot(&txn, request.slot_id).await?;
        let new_pickup = scheduling::combine(request.date, new_slot.start_time);
        if new_pickup < now {
            return Err(ServiceError::ValidationError(
                "Pickup time is in the past".to_string(),
            ));
        }

        let delivery_at = scheduled_delivery(&txn, &order).await?;
        if new_pickup >= delivery_at {
            return Err(ServiceError::ValidationError(
                "Pickup must remain before the scheduled delivery".to_string(),
            ));
        }

        let mut active: order::ActiveModel = order.into();
        active.pickup_date = Set(Some(request.date));
        active.pickup_slot_id = Set(Some(new_slot.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, new_date = %request.date, "Pickup rescheduled");
        self.notify_rescheduled(order_id).await;
        Ok(order_id)
    }

    /// Moves the delivery of a paid, created order to a new date/slot. The
    /// new delivery must stay strictly after the scheduled pickup.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn reschedule_delivery(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: RescheduleRequest,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;

        let order = lock_created_order(&txn, order_id, user_id).await?;
        require_advance_paid(&txn, order_id).await?;

        let current_delivery = scheduled_delivery(&txn, &order).await?;
        let now = Utc::now().naive_utc();
        if !scheduling::outside_cutoff(current_delivery, now) {
            return Err(ServiceError::ValidationError(
                "Delivery can only be rescheduled at least 12 hours before the current delivery"
                    .to_string(),
            ));
        }

        let new_slot = scheduling::active_slot(&txn, request.slot_id).await?;
        let new_delivery = scheduling::combine(request.date, new_slot.start_time);
        let pickup_at = scheduled_pickup(&txn, &order).await?;

        if new_delivery <= pickup_at {
            return Err(ServiceError::ValidationError(
                "Delivery must be after the scheduled pickup".to_string(),
            ));
        }

        let mut active: order::ActiveModel = order.into();
        active.delivery_date = Set(Some(request.date));
        active.delivery_slot_id = Set(Some(new_slot.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, new_date = %request.date, "Delivery rescheduled");
        self.notify_rescheduled(order_id).await;
        Ok(order_id)
    }

    /// Lists the caller's booked orders (non-draft, advance paid), newest
    /// first, optionally filtered by status and creation-time window.
    #[instrument(skip(self), fields(user_id = %user_id, page = page, limit = limit))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
        status: Option<OrderStatus>,
        date_range: DateRange,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.ne(OrderStatus::Draft))
            .inner_join(PaymentEntity)
            .filter(payment::Column::PaymentType.eq(PaymentType::Advance))
            .filter(payment::Column::Status.eq(PaymentStatus::Success))
            .distinct();

        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        if let Some(cutoff) = date_range.cutoff(Utc::now()) {
            query = query.filter(order::Column::CreatedAt.gte(cutoff));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let summaries = orders
            .into_iter()
            .map(|o| OrderSummary {
                order_id: o.id,
                status: o.status,
                clothes_count: o.clothes_count,
                estimated_weight_min: o.estimated_weight_min,
                estimated_weight_max: o.estimated_weight_max,
                pickup_date: o.pickup_date,
                delivery_date: o.delivery_date,
                estimated_total: o.estimated_total,
                created_at: o.created_at,
            })
            .collect::<Vec<_>>();

        Ok(OrderListResponse {
            total_pages: total.div_ceil(limit),
            total,
            page,
            limit,
            orders: summaries,
        })
    }

    async fn notify_rescheduled(&self, order_id: Uuid) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderRescheduled(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order rescheduled event");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared lookups
// ---------------------------------------------------------------------------

/// Row-locks the caller's draft order for the surrounding transaction.
async fn lock_draft_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    user_id: Uuid,
) -> Result<order::Model, ServiceError> {
    OrderEntity::find()
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::Status.eq(OrderStatus::Draft))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Draft order not found".to_string()))
}

/// The order's currently scheduled pickup datetime.
async fn scheduled_pickup<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
) -> Result<NaiveDateTime, ServiceError> {
    let (Some(date), Some(slot_id)) = (order.pickup_date, order.pickup_slot_id) else {
        return Err(ServiceError::InternalError(
            "Created order missing pickup schedule".to_string(),
        ));
    };
    let slot = TimeSlotEntity::find_by_id(slot_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError("Booked pickup slot missing".to_string()))?;
    Ok(scheduling::combine(date, slot.start_time))
}

/// The order's currently scheduled delivery datetime.
async fn scheduled_delivery<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
) -> Result<NaiveDateTime, ServiceError> {
    let (Some(date), Some(slot_id)) = (order.delivery_date, order.delivery_slot_id) else {
        return Err(ServiceError::InternalError(
            "Created order missing delivery schedule".to_string(),
        ));
    };
    let slot = TimeSlotEntity::find_by_id(slot_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError("Booked delivery slot missing".to_string()))?;
    Ok(scheduling::combine(date, slot.start_time))
}

/// Reschedules are only available once the advance payment has succeeded.
async fn require_advance_paid<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    let paid = PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .filter(payment::Column::PaymentType.eq(PaymentType::Advance))
        .filter(payment::Column::Status.eq(PaymentStatus::Success))
        .one(conn)
        .await?;

    if paid.is_none() {
        return Err(ServiceError::ValidationError(
            "Rescheduling is available after the advance payment succeeds".to_string(),
        ));
    }
    Ok(())
}
