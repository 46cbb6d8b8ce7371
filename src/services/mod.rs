pub mod coupons;
pub mod orders;
pub mod pricing;
pub mod scheduling;

use std::sync::Arc;

use crate::{config::AppConfig, db::DbPool, events::EventSender};

/// Aggregates the services used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<orders::OrderService>,
    pub coupons: Arc<coupons::CouponService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>, cfg: &AppConfig) -> Self {
        let coupons = Arc::new(coupons::CouponService::new(
            db.clone(),
            event_sender.clone(),
            cfg.reward_coupon_code.clone(),
            cfg.reward_validity_days,
        ));
        let orders = Arc::new(orders::OrderService::new(db, event_sender, coupons.clone()));
        Self { orders, coupons }
    }
}
