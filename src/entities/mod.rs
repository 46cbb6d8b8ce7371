pub mod coupon;
pub mod coupon_usage;
pub mod order;
pub mod order_cancellation;
pub mod payment;
pub mod service;
pub mod service_type;
pub mod time_slot;
pub mod user_address;
