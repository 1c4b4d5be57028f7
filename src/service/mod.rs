pub mod booking_service;
pub mod settlement_service;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::MarketplaceConfig;
use crate::notifications::NotificationDispatcher;
use crate::payments::PaymentGateway;
use crate::repository::*;

pub use booking_service::{BookingService, TransitionActor};
pub use settlement_service::SettlementService;

pub struct ServiceContext {
    pub booking_repo: Arc<dyn BookingRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub booking_service: Arc<BookingService>,
    pub settlement_service: Arc<SettlementService>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        booking_repo: Arc<dyn BookingRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        dispatcher: Arc<NotificationDispatcher>,
        marketplace: MarketplaceConfig,
        db_pool: SqlitePool,
    ) -> Self {
        let booking_service = Arc::new(BookingService::new(
            booking_repo.clone(),
            payment_repo.clone(),
            dispatcher.clone(),
            marketplace.clone(),
        ));
        let settlement_service = Arc::new(SettlementService::new(
            payment_repo.clone(),
            booking_repo.clone(),
            gateway,
            dispatcher.clone(),
            marketplace,
        ));

        Self {
            booking_repo,
            payment_repo,
            booking_service,
            settlement_service,
            dispatcher,
            db_pool,
        }
    }
}
