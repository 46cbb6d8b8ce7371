//! Slot lookup and the date/time rules shared by the order state machine:
//! pickup/delivery gap enforcement and the 12-hour reschedule/cancel cutoff.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::{
    entities::time_slot::{self, Entity as TimeSlotEntity},
    errors::ServiceError,
};

/// Pickup/delivery changes and cancellations are rejected inside this window
/// before the currently scheduled time.
pub const CUTOFF_HOURS: i64 = 12;

/// Builds the concrete datetime an order is scheduled for from its date and
/// the booked slot's start time. All schedule math uses UTC wall-clock.
pub fn combine(date: NaiveDate, slot_start: NaiveTime) -> NaiveDateTime {
    date.and_time(slot_start)
}

/// Earliest permissible delivery for a pickup and a service type's gap.
pub fn earliest_delivery(pickup: NaiveDateTime, delivery_hours: i32) -> NaiveDateTime {
    pickup + Duration::hours(delivery_hours as i64)
}

/// True when `scheduled` is at least [`CUTOFF_HOURS`] away from `now`.
/// Exactly 12h0m is allowed; 11h59m is not.
pub fn outside_cutoff(scheduled: NaiveDateTime, now: NaiveDateTime) -> bool {
    scheduled - now >= Duration::hours(CUTOFF_HOURS)
}

/// Fetches a slot that exists and is active; anything else is a validation
/// failure (the caller passed a bookable-slot id from the client).
pub async fn active_slot<C: ConnectionTrait>(
    conn: &C,
    slot_id: i32,
) -> Result<time_slot::Model, ServiceError> {
    TimeSlotEntity::find_by_id(slot_id)
        .filter(time_slot::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::ValidationError("Invalid or inactive time slot".to_string()))
}
