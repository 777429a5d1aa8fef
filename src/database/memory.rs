// database/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::errors::Result;
use crate::models::booking::{Booking, BookingStatus, NewBooking, PriceTerms};
use crate::models::payment::{NewPayment, Payment};

use super::{BookingStore, VehicleCatalog};

#[derive(Default)]
struct Inner {
    bookings: HashMap<i64, Booking>,
    payments: HashMap<i64, Payment>,
}

/// In-memory transactional store. One mutex covers bookings and payments, so
/// every guarded operation observes and writes a consistent snapshot — the
/// compare-and-set the booking lifecycle relies on.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    booking_seq: AtomicI64,
    payment_seq: AtomicI64,
    rates: Mutex<HashMap<i64, PriceTerms>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a catalog entry. Stands in for the external vehicle catalog.
    pub fn seed_vehicle(&self, vehicle_id: i64, terms: PriceTerms) {
        self.rates.lock().unwrap().insert(vehicle_id, terms);
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking> {
        let id = self.booking_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = Booking {
            id,
            customer_id: booking.customer_id,
            vehicle_id: booking.vehicle_id,
            start_date: booking.start_date,
            end_date: booking.end_date,
            status: booking.status,
            price: booking.price,
            license_image: booking.license_image,
            created_at: booking.created_at,
        };
        self.inner.lock().unwrap().bookings.insert(id, stored.clone());
        Ok(stored)
    }

    async fn booking(&self, id: i64) -> Result<Option<Booking>> {
        Ok(self.inner.lock().unwrap().bookings.get(&id).cloned())
    }

    async fn live_booking_for_customer(&self, customer_id: i64) -> Result<Option<Booking>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bookings
            .values()
            .find(|b| b.customer_id == customer_id && b.status.is_live())
            .cloned())
    }

    async fn live_bookings_for_vehicle(&self, vehicle_id: i64) -> Result<Vec<Booking>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.vehicle_id == vehicle_id && b.status.is_live())
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: i64,
        expected: &[BookingStatus],
        next: BookingStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.bookings.get_mut(&id) {
            Some(booking) if expected.contains(&booking.status) => {
                booking.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_with_payment(
        &self,
        id: i64,
        expected: &[BookingStatus],
        next: BookingStatus,
        payment: NewPayment,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner
            .payments
            .values()
            .any(|p| p.success && p.txn_ref == payment.txn_ref);
        if duplicate {
            return Ok(false);
        }

        let accepted = match inner.bookings.get_mut(&id) {
            Some(booking) if expected.contains(&booking.status) => {
                booking.status = next;
                true
            }
            _ => false,
        };
        if !accepted {
            return Ok(false);
        }

        let payment_id = self.payment_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Payment {
            id: payment_id,
            booking_id: payment.booking_id,
            amount: payment.amount,
            txn_ref: payment.txn_ref,
            paid_at: payment.paid_at,
            success: payment.success,
            created_at: Utc::now(),
        };
        inner.payments.insert(payment_id, row);
        Ok(true)
    }

    async fn delete_booking_if(&self, id: i64, expected: BookingStatus) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let matches = inner
            .bookings
            .get(&id)
            .map_or(false, |booking| booking.status == expected);
        if matches {
            inner.bookings.remove(&id);
        }
        Ok(matches)
    }

    async fn payments_for_booking(&self, booking_id: i64) -> Result<Vec<Payment>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.id);
        Ok(rows)
    }

    async fn payment_by_txn_ref(&self, txn_ref: &str) -> Result<Option<Payment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .payments
            .values()
            .find(|p| p.success && p.txn_ref == txn_ref)
            .cloned())
    }
}

#[async_trait]
impl VehicleCatalog for MemoryStore {
    async fn price_terms(&self, vehicle_id: i64) -> Result<Option<PriceTerms>> {
        Ok(self.rates.lock().unwrap().get(&vehicle_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_booking(customer_id: i64, vehicle_id: i64) -> NewBooking {
        NewBooking {
            customer_id,
            vehicle_id,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: BookingStatus::AwaitingPayment,
            price: PriceTerms {
                rate_per_day: 15_000_000,
                deposit_percent: 30,
                tax_percent: 0,
                discount_percent: 0,
            },
            license_image: None,
            created_at: Utc::now(),
        }
    }

    fn deposit_payment(booking_id: i64, txn_ref: &str) -> NewPayment {
        NewPayment {
            booking_id,
            amount: 4_500_000,
            txn_ref: txn_ref.to_string(),
            paid_at: Utc::now(),
            success: true,
        }
    }

    #[tokio::test]
    async fn test_guarded_transition_applies_once() {
        let store = MemoryStore::new();
        let booking = store.insert_booking(new_booking(1, 9)).await.unwrap();

        let first = store
            .transition(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Upcoming,
            )
            .await
            .unwrap();
        let second = store
            .transition(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Upcoming,
            )
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let status = store.booking(booking.id).await.unwrap().unwrap().status;
        assert_eq!(status, BookingStatus::Upcoming);
    }

    #[tokio::test]
    async fn test_transition_with_payment_writes_both_or_neither() {
        let store = MemoryStore::new();
        let booking = store.insert_booking(new_booking(1, 9)).await.unwrap();

        let applied = store
            .transition_with_payment(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Upcoming,
                deposit_payment(booking.id, "1_1700000000"),
            )
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(store.payments_for_booking(booking.id).await.unwrap().len(), 1);

        // Wrong precondition: no status change, no payment row.
        let replay = store
            .transition_with_payment(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Upcoming,
                deposit_payment(booking.id, "1_1700000001"),
            )
            .await
            .unwrap();
        assert!(!replay);
        assert_eq!(store.payments_for_booking(booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_txn_ref_is_rejected() {
        let store = MemoryStore::new();
        let booking = store.insert_booking(new_booking(1, 9)).await.unwrap();

        store
            .transition_with_payment(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Upcoming,
                deposit_payment(booking.id, "1_1700000000"),
            )
            .await
            .unwrap();

        // Same txnRef against a status that would otherwise pass the guard.
        let replay = store
            .transition_with_payment(
                booking.id,
                &[BookingStatus::Upcoming],
                BookingStatus::Confirmed,
                deposit_payment(booking.id, "1_1700000000"),
            )
            .await
            .unwrap();
        assert!(!replay);
        assert_eq!(store.payments_for_booking(booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_booking_if_guards_status() {
        let store = MemoryStore::new();
        let booking = store.insert_booking(new_booking(1, 9)).await.unwrap();

        store
            .transition(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Upcoming,
            )
            .await
            .unwrap();

        let deleted = store
            .delete_booking_if(booking.id, BookingStatus::AwaitingPayment)
            .await
            .unwrap();
        assert!(!deleted);
        assert!(store.booking(booking.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_live_queries_ignore_settled_bookings() {
        let store = MemoryStore::new();
        let booking = store.insert_booking(new_booking(5, 9)).await.unwrap();
        store
            .transition(
                booking.id,
                &[BookingStatus::AwaitingPayment],
                BookingStatus::Cancelled,
            )
            .await
            .unwrap();

        assert!(store.live_booking_for_customer(5).await.unwrap().is_none());
        assert!(store.live_bookings_for_vehicle(9).await.unwrap().is_empty());
    }
}
