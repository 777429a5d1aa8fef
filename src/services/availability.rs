// services/availability.rs
use chrono::NaiveDate;
use std::sync::Arc;

use crate::database::BookingStore;
use crate::errors::Result;

/// Day-granular overlap on the same vehicle: two ranges collide when they
/// share at least one day.
pub fn ranges_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    !(a_end < b_start || a_start > b_end)
}

/// Availability checks applied at creation time only; confirmations never
/// re-check.
pub struct AvailabilityChecker {
    store: Arc<dyn BookingStore>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// False when the customer already holds a live booking (any vehicle) or
    /// the vehicle has a live booking overlapping the requested range.
    pub async fn can_book(
        &self,
        customer_id: i64,
        vehicle_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool> {
        if self
            .store
            .live_booking_for_customer(customer_id)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let existing = self.store.live_bookings_for_vehicle(vehicle_id).await?;
        Ok(!existing
            .iter()
            .any(|booking| ranges_overlap(booking.start_date, booking.end_date, start, end)))
    }
}
