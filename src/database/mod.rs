pub mod memory;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::booking::{Booking, BookingStatus, NewBooking, PriceTerms};
use crate::models::payment::{NewPayment, Payment};

/// Transactional booking store. Status writes are guarded compare-and-set
/// operations: they apply only if the current status is in `expected`, so
/// concurrent notification deliveries and the reaper cannot race each other
/// into a double transition.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking>;

    async fn booking(&self, id: i64) -> Result<Option<Booking>>;

    /// The customer's booking in a live status, if any.
    async fn live_booking_for_customer(&self, customer_id: i64) -> Result<Option<Booking>>;

    async fn live_bookings_for_vehicle(&self, vehicle_id: i64) -> Result<Vec<Booking>>;

    /// Guarded transition. Returns false (no mutation) when the current
    /// status is not in `expected`.
    async fn transition(
        &self,
        id: i64,
        expected: &[BookingStatus],
        next: BookingStatus,
    ) -> Result<bool>;

    /// Guarded transition plus a payment row, committed in the same unit of
    /// work. Also refuses to apply when a successful payment with the same
    /// txnRef already exists, which makes replayed notifications no-ops.
    async fn transition_with_payment(
        &self,
        id: i64,
        expected: &[BookingStatus],
        next: BookingStatus,
        payment: NewPayment,
    ) -> Result<bool>;

    /// Guarded delete used by the reaper. Returns false when the booking is
    /// missing or has left `expected`.
    async fn delete_booking_if(&self, id: i64, expected: BookingStatus) -> Result<bool>;

    async fn payments_for_booking(&self, booking_id: i64) -> Result<Vec<Payment>>;

    /// Settled payment previously recorded for this txnRef, if any. Lets the
    /// notification path tell a replayed delivery apart from a payment that
    /// genuinely cannot be reconciled.
    async fn payment_by_txn_ref(&self, txn_ref: &str) -> Result<Option<Payment>>;
}

/// Consumed interface to the external vehicle catalog: the only thing the
/// booking flow needs from it is a price snapshot per vehicle.
#[async_trait]
pub trait VehicleCatalog: Send + Sync {
    async fn price_terms(&self, vehicle_id: i64) -> Result<Option<PriceTerms>>;
}
