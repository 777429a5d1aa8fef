// models/booking.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Statuses in which a booking blocks the vehicle and counts against the
/// customer's single-booking limit.
pub const LIVE_STATUSES: [BookingStatus; 3] = [
    BookingStatus::AwaitingPayment,
    BookingStatus::Upcoming,
    BookingStatus::Active,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    AwaitingPayment,
    Upcoming,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Staff-facing transition table. Payment confirmations go through the
    /// guarded store primitive and are a subset of these edges.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (AwaitingPayment, Upcoming)
                | (AwaitingPayment, Confirmed)
                | (AwaitingPayment, Cancelled)
                | (Upcoming, Confirmed)
                | (Upcoming, Active)
                | (Upcoming, Cancelled)
                | (Confirmed, Active)
                | (Confirmed, Cancelled)
                | (Active, Completed)
        )
    }

    pub fn is_live(self) -> bool {
        LIVE_STATUSES.contains(&self)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::AwaitingPayment => "AwaitingPayment",
            BookingStatus::Upcoming => "Upcoming",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Active => "Active",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Price snapshot copied from the vehicle catalog at creation time.
/// All amounts are gateway minor units; derived values truncate to whole
/// units before they are signed or stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceTerms {
    pub rate_per_day: i64,
    pub deposit_percent: i64,
    pub tax_percent: i64,
    pub discount_percent: i64,
}

impl PriceTerms {
    pub fn total_amount(&self, days: i64) -> i64 {
        let base = self.rate_per_day * days.max(1);
        let discounted = base - base * self.discount_percent / 100;
        discounted + discounted * self.tax_percent / 100
    }

    pub fn deposit_amount(&self, days: i64) -> i64 {
        self.total_amount(days) * self.deposit_percent / 100
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub customer_id: i64,
    pub vehicle_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub price: PriceTerms,
    pub license_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Day-granular rental length, minimum one billable day.
    pub fn rental_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days().max(1)
    }

    pub fn total_amount(&self) -> i64 {
        self.price.total_amount(self.rental_days())
    }

    pub fn deposit_amount(&self) -> i64 {
        self.price.deposit_amount(self.rental_days())
    }
}

/// Insert payload; the store assigns id and stamps nothing else.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: i64,
    pub vehicle_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub price: PriceTerms,
    pub license_image: Option<String>,
    pub created_at: DateTime<Utc>,
}
