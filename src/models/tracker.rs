// models/tracker.rs
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Hold placed on a booking while it sits in AwaitingPayment. The reaper
/// deletes the booking once the hold expires without a confirmation.
#[derive(Debug, Clone)]
pub struct PendingReservation {
    pub booking_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Concurrency-safe set of pending reservations. Producers insert while the
/// reaper snapshots and removes; the map is never iterated while mutating.
#[derive(Default)]
pub struct PendingReservations {
    inner: Mutex<HashMap<i64, PendingReservation>>,
}

impl PendingReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, booking_id: i64, ttl: Duration) {
        let now = Utc::now();
        let entry = PendingReservation {
            booking_id,
            created_at: now,
            expires_at: now + ttl,
        };
        self.inner.lock().unwrap().insert(booking_id, entry);
    }

    pub fn remove(&self, booking_id: i64) -> bool {
        self.inner.lock().unwrap().remove(&booking_id).is_some()
    }

    pub fn contains(&self, booking_id: i64) -> bool {
        self.inner.lock().unwrap().contains_key(&booking_id)
    }

    /// Snapshot of entries past their expiry. Entries stay registered until
    /// the caller confirms the cleanup and removes them.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<PendingReservation> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.expires_at <= now)
            .cloned()
            .collect()
    }
}

/// An uploaded license image that no booking has claimed yet.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub customer_id: i64,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ImageUploads {
    inner: Mutex<HashMap<String, ImageUpload>>,
}

impl ImageUploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, customer_id: i64, file_name: &str, ttl: Duration) {
        let now = Utc::now();
        let entry = ImageUpload {
            customer_id,
            file_name: file_name.to_string(),
            uploaded_at: now,
            expires_at: now + ttl,
        };
        self.inner.lock().unwrap().insert(file_name.to_string(), entry);
    }

    /// Claims an upload for a booking. Returns false if the file was never
    /// tracked or has already been consumed or reaped.
    pub fn consume(&self, file_name: &str) -> bool {
        self.inner.lock().unwrap().remove(file_name).is_some()
    }

    pub fn remove(&self, file_name: &str) -> bool {
        self.inner.lock().unwrap().remove(file_name).is_some()
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.inner.lock().unwrap().contains_key(file_name)
    }

    pub fn expired(&self, now: DateTime<Utc>) -> Vec<ImageUpload> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.expires_at <= now)
            .cloned()
            .collect()
    }
}
