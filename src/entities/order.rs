use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of order states. The core state machine only ever writes
/// Draft, Created and Cancelled; the remaining fulfillment states belong to
/// the external fulfillment collaborator and are carried for compatibility.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "picked_up")]
    PickedUp,
    #[sea_orm(string_value = "in_process")]
    InProcess,
    #[sea_orm(string_value = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// One customer wash-cycle request, built up step by step while `draft` and
/// price-snapshotted when it becomes `created`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
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
    pub applied_coupon_id: Option<Uuid>,
    // Reference prices snapshotted at finalize so later tariff changes do
    // not reprice an already-created order.
    pub base_price_per_kg: Option<Decimal>,
    pub extra_price_per_kg: Option<Decimal>,
    pub flat_fee: Option<Decimal>,
    pub peak_extra_charge: Option<Decimal>,
    pub estimated_total: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::coupon::Entity",
        from = "Column::AppliedCouponId",
        to = "super::coupon::Column::Id"
    )]
    Coupon,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
