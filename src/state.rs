use chrono::Duration;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::memory::MemoryStore;
use crate::database::BookingStore;
use crate::models::tracker::{ImageUploads, PendingReservations};
use crate::services::booking_service::BookingService;
use crate::services::ipn_service::IpnService;
use crate::services::vnpay_service::VnpayService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn BookingStore>,
    pub bookings: Arc<BookingService>,
    pub vnpay: Arc<VnpayService>,
    pub ipn: Arc<IpnService>,
    pub pending: Arc<PendingReservations>,
    pub uploads: Arc<ImageUploads>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<MemoryStore>) -> Self {
        let pending = Arc::new(PendingReservations::new());
        let uploads = Arc::new(ImageUploads::new());
        let vnpay = Arc::new(VnpayService::new(&config));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            store.clone(),
            pending.clone(),
            uploads.clone(),
            vnpay.clone(),
            Duration::minutes(config.pending_hold_minutes),
        ));
        let ipn = Arc::new(IpnService::new(&config, bookings.clone()));

        AppState {
            config: Arc::new(config),
            store,
            bookings,
            vnpay,
            ipn,
            pending,
            uploads,
        }
    }
}
