// services/booking_service.rs
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::database::{BookingStore, VehicleCatalog};
use crate::errors::{AppError, Result};
use crate::models::booking::{Booking, BookingStatus, NewBooking};
use crate::models::payment::{parse_gateway_datetime, NewPayment};
use crate::models::tracker::{ImageUploads, PendingReservations};
use crate::services::availability::AvailabilityChecker;
use crate::services::vnpay_service::{VnpayService, REFUND_FULL};

// Source address stamped on gateway calls the platform makes on its own
// behalf (compensating refunds), where no customer request is in flight.
const SYSTEM_IP: &str = "127.0.0.1";
const SYSTEM_OPERATOR: &str = "system";

/// Owns every booking status transition. All writes go through the store's
/// guarded compare-and-set, so duplicate notification deliveries and the
/// reaper cannot double-apply.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn VehicleCatalog>,
    availability: AvailabilityChecker,
    pending: Arc<PendingReservations>,
    uploads: Arc<ImageUploads>,
    gateway: Arc<VnpayService>,
    hold_ttl: Duration,
    // Serializes availability check + insert so two concurrent creations
    // cannot both pass the check.
    create_lock: Mutex<()>,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn VehicleCatalog>,
        pending: Arc<PendingReservations>,
        uploads: Arc<ImageUploads>,
        gateway: Arc<VnpayService>,
        hold_ttl: Duration,
    ) -> Self {
        let availability = AvailabilityChecker::new(store.clone());
        Self {
            store,
            catalog,
            availability,
            pending,
            uploads,
            gateway,
            hold_ttl,
            create_lock: Mutex::new(()),
        }
    }

    pub async fn create_booking(
        &self,
        customer_id: i64,
        vehicle_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        license_image: Option<String>,
    ) -> Result<Booking> {
        if start_date >= end_date {
            return Err(AppError::validation("start date must be before end date"));
        }

        let price = self
            .catalog
            .price_terms(vehicle_id)
            .await?
            .ok_or_else(|| AppError::validation(format!("unknown vehicle {}", vehicle_id)))?;

        let _guard = self.create_lock.lock().await;

        if !self
            .availability
            .can_book(customer_id, vehicle_id, start_date, end_date)
            .await?
        {
            return Err(AppError::conflict(
                "vehicle is unavailable for the requested dates or customer already holds a booking",
            ));
        }

        if let Some(file_name) = &license_image {
            if !self.uploads.consume(file_name) {
                return Err(AppError::validation(
                    "license image not found or already expired",
                ));
            }
        }

        let booking = self
            .store
            .insert_booking(NewBooking {
                customer_id,
                vehicle_id,
                start_date,
                end_date,
                status: BookingStatus::AwaitingPayment,
                price,
                license_image,
                created_at: Utc::now(),
            })
            .await?;

        self.pending.register(booking.id, self.hold_ttl);
        info!(
            "Created booking {} for customer {} on vehicle {} ({} - {})",
            booking.id, customer_id, vehicle_id, start_date, end_date
        );
        Ok(booking)
    }

    pub async fn booking(&self, id: i64) -> Result<Option<Booking>> {
        self.store.booking(id).await
    }

    /// Outstanding balance: snapshot total minus settled payments.
    pub async fn outstanding_amount(&self, booking: &Booking) -> Result<i64> {
        let paid: i64 = self
            .store
            .payments_for_booking(booking.id)
            .await?
            .iter()
            .filter(|p| p.success)
            .map(|p| p.amount)
            .sum();
        Ok(booking.total_amount() - paid)
    }

    /// Guarded confirmation invoked by the notification path. Returns false
    /// (no mutation anywhere) when the booking is not in a state that
    /// accepts this payment phase, or the txnRef was already settled.
    pub async fn confirm_payment(
        &self,
        booking_id: i64,
        amount_paid: i64,
        is_final_payment: bool,
        txn_ref: &str,
        pay_date: &str,
    ) -> Result<bool> {
        let (expected, next): (&[BookingStatus], BookingStatus) = if is_final_payment {
            (
                &[BookingStatus::Upcoming, BookingStatus::Confirmed],
                BookingStatus::Confirmed,
            )
        } else {
            (&[BookingStatus::AwaitingPayment], BookingStatus::Upcoming)
        };

        let payment = NewPayment {
            booking_id,
            amount: amount_paid,
            txn_ref: txn_ref.to_string(),
            paid_at: parse_gateway_datetime(pay_date).unwrap_or_else(Utc::now),
            success: true,
        };

        let applied = self
            .store
            .transition_with_payment(booking_id, expected, next, payment)
            .await?;

        if applied {
            self.pending.remove(booking_id);
            info!(
                "Booking {} confirmed ({}) for {}",
                booking_id,
                if is_final_payment { "final" } else { "deposit" },
                amount_paid
            );
        }
        Ok(applied)
    }

    /// True when a settled payment already carries this txnRef.
    pub async fn payment_recorded(&self, txn_ref: &str) -> Result<bool> {
        Ok(self.store.payment_by_txn_ref(txn_ref).await?.is_some())
    }

    /// Cancels a booking whose payment attempt the gateway reported as
    /// failed. No-op once the booking has left AwaitingPayment.
    pub async fn mark_payment_failed(&self, booking_id: i64) -> Result<bool> {
        let applied = self
            .store
            .transition(
                booking_id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Cancelled,
            )
            .await?;
        if applied {
            self.pending.remove(booking_id);
            info!("Booking {} cancelled after failed payment", booking_id);
        }
        Ok(applied)
    }

    /// Staff-driven transition, checked against the adjacency table.
    pub async fn update_status(&self, booking_id: i64, next: BookingStatus) -> Result<Booking> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("booking {}", booking_id)))?;

        if !booking.status.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "cannot transition booking {} from {} to {}",
                booking_id, booking.status, next
            )));
        }

        let applied = self.store.transition(booking_id, &[booking.status], next).await?;
        if !applied {
            // Lost the race against a notification or the reaper.
            return Err(AppError::conflict(format!(
                "booking {} changed state concurrently",
                booking_id
            )));
        }

        if booking.status == BookingStatus::AwaitingPayment {
            self.pending.remove(booking_id);
        }
        info!("Booking {} moved {} -> {}", booking_id, booking.status, next);

        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| AppError::storage(format!("booking {} vanished mid-update", booking_id)))
    }

    /// Compensating action for a captured payment that could not be
    /// reconciled: cancel whatever booking state remains and push the money
    /// back through the gateway. Returns true when the gateway acknowledged
    /// the refund.
    pub async fn handle_cancel_and_refund(
        &self,
        booking_id: i64,
        txn_ref: &str,
        amount: i64,
        transaction_date: &str,
    ) -> Result<bool> {
        let cancelled = self
            .store
            .transition(
                booking_id,
                &[
                    BookingStatus::AwaitingPayment,
                    BookingStatus::Upcoming,
                    BookingStatus::Confirmed,
                ],
                BookingStatus::Cancelled,
            )
            .await?;
        if cancelled {
            self.pending.remove(booking_id);
            warn!("Booking {} cancelled pending refund of {}", booking_id, amount);
        }

        let refunded = self
            .gateway
            .issue_refund(
                SYSTEM_IP,
                REFUND_FULL,
                txn_ref,
                amount,
                transaction_date,
                SYSTEM_OPERATOR,
            )
            .await?;
        if refunded {
            info!("Refund issued for txnRef {} ({})", txn_ref, amount);
        } else {
            error!("Gateway declined refund for txnRef {} ({})", txn_ref, amount);
        }
        Ok(refunded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::memory::MemoryStore;
    use crate::models::booking::PriceTerms;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_config() -> AppConfig {
        AppConfig {
            vnpay_tmn_code: "TESTCODE".to_string(),
            vnpay_hash_secret: "test-secret".to_string(),
            vnpay_pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            vnpay_api_url: "http://127.0.0.1:9/unreachable".to_string(),
            vnpay_return_url: "https://example.com/payment/return".to_string(),
            payment_timeout_minutes: 15,
            pending_hold_minutes: 15,
            upload_ttl_minutes: 30,
            reaper_interval_secs: 60,
            upload_dir: "uploads/licenses".to_string(),
            jwt_secret: "jwt-secret".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }

    fn service_with_store() -> (Arc<MemoryStore>, BookingService) {
        let store = Arc::new(MemoryStore::new());
        store.seed_vehicle(
            9,
            PriceTerms {
                rate_per_day: 15_000_000,
                deposit_percent: 30,
                tax_percent: 0,
                discount_percent: 0,
            },
        );
        let service = BookingService::new(
            store.clone(),
            store.clone(),
            Arc::new(PendingReservations::new()),
            Arc::new(ImageUploads::new()),
            Arc::new(VnpayService::new(&test_config())),
            Duration::minutes(15),
        );
        (store, service)
    }

    #[tokio::test]
    async fn test_create_booking_registers_pending_hold() {
        let (_, service) = service_with_store();
        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::AwaitingPayment);
        assert!(service.pending.contains(booking.id));
    }

    #[tokio::test]
    async fn test_create_booking_rejects_inverted_range() {
        let (_, service) = service_with_store();
        let result = service
            .create_booking(5, 9, date(2024, 1, 15), date(2024, 1, 10), None)
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_booking_rejects_unknown_vehicle() {
        let (_, service) = service_with_store();
        let result = service
            .create_booking(5, 404, date(2024, 1, 10), date(2024, 1, 15), None)
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_booking_conflicts_on_overlap() {
        let (_, service) = service_with_store();
        service
            .create_booking(1, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        let result = service
            .create_booking(2, 9, date(2024, 1, 14), date(2024, 1, 20), None)
            .await;
        assert!(matches!(result, Err(AppError::StateConflict(_))));
    }

    #[tokio::test]
    async fn test_deposit_confirmation_transitions_and_is_idempotent() {
        let (store, service) = service_with_store();
        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        let first = service
            .confirm_payment(booking.id, 22_500_000, false, "42_1700000000", "20240109120000")
            .await
            .unwrap();
        let replay = service
            .confirm_payment(booking.id, 22_500_000, false, "42_1700000000", "20240109120000")
            .await
            .unwrap();

        assert!(first);
        assert!(!replay);
        let stored = store.booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Upcoming);
        assert_eq!(store.payments_for_booking(booking.id).await.unwrap().len(), 1);
        assert!(!service.pending.contains(booking.id));
    }

    #[tokio::test]
    async fn test_final_payment_requires_upcoming() {
        let (store, service) = service_with_store();
        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        // Final payment against a booking that never paid a deposit.
        let applied = service
            .confirm_payment(booking.id, 52_500_000, true, "f42_1700000000", "20240109120000")
            .await
            .unwrap();
        assert!(!applied);
        let stored = store.booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::AwaitingPayment);
    }

    #[tokio::test]
    async fn test_mark_payment_failed_cancels_once() {
        let (store, service) = service_with_store();
        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        assert!(service.mark_payment_failed(booking.id).await.unwrap());
        assert!(!service.mark_payment_failed(booking.id).await.unwrap());
        let stored = store.booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert!(!service.pending.contains(booking.id));
    }

    #[tokio::test]
    async fn test_update_status_rejects_illegal_edges() {
        let (_, service) = service_with_store();
        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        let result = service
            .update_status(booking.id, BookingStatus::Completed)
            .await;
        assert!(matches!(result, Err(AppError::StateConflict(_))));

        let updated = service
            .update_status(booking.id, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_create_booking_consumes_license_upload() {
        let (_, service) = service_with_store();
        service
            .uploads
            .register(5, "license.jpg", Duration::minutes(30));

        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), Some("license.jpg".to_string()))
            .await
            .unwrap();
        assert_eq!(booking.license_image.as_deref(), Some("license.jpg"));
        assert!(!service.uploads.contains("license.jpg"));

        // A second booking cannot claim the same consumed upload.
        let result = service
            .create_booking(6, 9, date(2024, 2, 10), date(2024, 2, 15), Some("license.jpg".to_string()))
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_outstanding_amount_subtracts_settled_payments() {
        let (_, service) = service_with_store();
        let booking = service
            .create_booking(5, 9, date(2024, 1, 10), date(2024, 1, 15), None)
            .await
            .unwrap();

        // 5 days * 15_000_000 = 75_000_000 total; 30% deposit = 22_500_000
        assert_eq!(service.outstanding_amount(&booking).await.unwrap(), 75_000_000);

        service
            .confirm_payment(booking.id, 22_500_000, false, "1_1700000000", "20240109120000")
            .await
            .unwrap();
        assert_eq!(service.outstanding_amount(&booking).await.unwrap(), 52_500_000);
    }
}
