use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use yatri_domain::{BookingStore, ChangeEvent, ChangeOp, LeaseStore};
use yatri_store::app_config::BusinessRules;

use crate::feed::ChangeFeed;

/// Background housekeeping. Deletes leases past their expiry (a liveness
/// optimization only; reads already ignore stale leases) and enforces the
/// checkout timeout by cancelling pending bookings that outlived it — that
/// half is a correctness duty, since the booking row is the authoritative
/// "taken" signal once it exists. A failed sweep is logged and retried on
/// the next tick, never fatal.
pub struct ExpiryReaper {
    leases: Arc<dyn LeaseStore>,
    bookings: Arc<dyn BookingStore>,
    feed: ChangeFeed,
    rules: BusinessRules,
}

impl ExpiryReaper {
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        bookings: Arc<dyn BookingStore>,
        feed: ChangeFeed,
        rules: BusinessRules,
    ) -> Self {
        Self {
            leases,
            bookings,
            feed,
            rules,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.rules.reaper_interval_seconds);
        tokio::spawn(async move {
            info!(interval_secs = self.rules.reaper_interval_seconds, "expiry reaper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }

    pub async fn sweep_once(&self) {
        let now = Utc::now();

        match self.leases.sweep_expired(now).await {
            Ok(removed) if removed.is_empty() => {}
            Ok(removed) => {
                debug!(count = removed.len(), "swept expired leases");
                self.feed.publish_all(
                    removed
                        .into_iter()
                        .map(|l| ChangeEvent::lease(ChangeOp::Deleted, l)),
                );
            }
            Err(e) => warn!("lease sweep failed: {}", e),
        }

        let cutoff = now - chrono::Duration::seconds(self.rules.pending_timeout_seconds as i64);
        match self.bookings.cancel_stale_pending(cutoff).await {
            Ok(cancelled) => {
                for (booking, released) in cancelled {
                    info!(booking_id = %booking.id, "pending booking timed out");
                    self.feed
                        .publish(ChangeEvent::booking(ChangeOp::Updated, &booking));
                    self.feed.publish_all(
                        released
                            .into_iter()
                            .map(|l| ChangeEvent::lease(ChangeOp::Deleted, l)),
                    );
                }
            }
            Err(e) => warn!("pending-booking timeout sweep failed: {}", e),
        }
    }
}
