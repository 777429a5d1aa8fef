// services/reaper.rs
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::database::BookingStore;
use crate::models::booking::BookingStatus;
use crate::models::tracker::{ImageUploads, PendingReservations};

/// Background sweep over expired holds: unpaid bookings past their hold are
/// deleted, orphaned license uploads past their TTL are removed from disk.
/// One failing item never aborts the rest of the sweep.
pub struct Reaper {
    store: Arc<dyn BookingStore>,
    pending: Arc<PendingReservations>,
    uploads: Arc<ImageUploads>,
    upload_dir: PathBuf,
    interval: Duration,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn BookingStore>,
        pending: Arc<PendingReservations>,
        uploads: Arc<ImageUploads>,
        upload_dir: PathBuf,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            pending,
            uploads,
            upload_dir,
            interval,
        }
    }

    /// Runs until the token is cancelled. Cancellation is only observed
    /// between ticks; a sweep item either completes or fails whole.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Reservation reaper started (interval {:?})", self.interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Reservation reaper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep(Utc::now()).await;
                }
            }
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) {
        for entry in self.pending.expired(now) {
            match self
                .store
                .delete_booking_if(entry.booking_id, BookingStatus::AwaitingPayment)
                .await
            {
                Ok(true) => {
                    self.pending.remove(entry.booking_id);
                    info!("Expired unpaid booking {}", entry.booking_id);
                }
                Ok(false) => {
                    // Confirmed or cancelled while the hold aged out; the
                    // tracker is stale either way.
                    self.pending.remove(entry.booking_id);
                }
                Err(e) => {
                    // Keep the tracker; the next sweep retries.
                    error!("Failed to expire booking {}: {}", entry.booking_id, e);
                }
            }
        }

        for upload in self.uploads.expired(now) {
            let path = self.upload_dir.join(&upload.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    self.uploads.remove(&upload.file_name);
                    info!("Removed orphaned upload {}", upload.file_name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.uploads.remove(&upload.file_name);
                }
                Err(e) => {
                    error!("Failed to remove upload {}: {}", upload.file_name, e);
                }
            }
        }
    }
}
