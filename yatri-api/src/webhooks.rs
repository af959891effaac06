use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use yatri_domain::{BookingStatus, EngineError};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub event_type: String,
    pub payment_ref: String,
    pub booking_id: Uuid,
}

/// POST /v1/webhooks/payments
/// Payment-provider callback. Delivery is at-least-once, so a duplicate
/// `succeeded` event for an already-confirmed booking is answered with 200
/// and no further effect.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        event = %payload.event_type,
        booking_id = %payload.booking_id,
        "payment webhook received"
    );

    match payload.event_type.as_str() {
        "payment.succeeded" => {
            state
                .bookings
                .confirm(payload.booking_id, &payload.payment_ref)
                .await?;
        }
        "payment.failed" | "payment.cancelled" => {
            match state.bookings.cancel(payload.booking_id).await {
                Ok(_) => {}
                // Redelivered or out-of-order failure: the booking was
                // already cancelled (reaper, prior event) or a success event
                // confirmed it first. Acknowledge so the gateway stops
                // retrying the delivery.
                Err(EngineError::InvalidTransition {
                    from: BookingStatus::Cancelled | BookingStatus::Confirmed,
                    ..
                }) => {
                    tracing::debug!(booking_id = %payload.booking_id, "stale failure event ignored");
                }
                Err(e) => return Err(e.into()),
            }
        }
        other => {
            tracing::debug!(event = other, "unhandled webhook event type");
        }
    }

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::Json;

    use yatri_domain::{BookingStore, ClaimOutcome, CoinLedger, LeaseStore};
    use yatri_engine::{BookingService, ChangeFeed, CoinService, SeatLockManager};
    use yatri_store::app_config::BusinessRules;
    use yatri_store::MemoryStore;

    use super::*;
    use crate::state::{AppState, AuthConfig};

    fn test_state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        store.put_bus(10, 50_000);

        let leases: Arc<dyn LeaseStore> = store.clone();
        let bookings: Arc<dyn BookingStore> = store.clone();
        let ledger: Arc<dyn CoinLedger> = store.clone();

        let rules = BusinessRules::default();
        let feed = ChangeFeed::new(64);
        let state = AppState {
            locks: Arc::new(SeatLockManager::new(
                leases,
                bookings.clone(),
                feed.clone(),
                rules.clone(),
            )),
            bookings: Arc::new(BookingService::new(bookings, feed.clone(), rules.clone())),
            coins: Arc::new(CoinService::new(ledger)),
            feed,
            auth: AuthConfig {
                secret: "test-secret".to_string(),
                expiration: 3600,
            },
            business_rules: rules,
        };
        (store, state)
    }

    async fn pending_booking(state: &AppState) -> Uuid {
        let claim = state
            .locks
            .claim(10, &["L1".to_string()], "user-1", None)
            .await
            .unwrap();
        assert!(matches!(claim, ClaimOutcome::Granted(_)));

        state
            .bookings
            .create_pending(
                10,
                &["L1".to_string()],
                "user-1",
                serde_json::json!([{ "name": "Asha Verma", "age": 29 }]),
                serde_json::json!({ "email": "asha@example.com" }),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn succeeded_event_confirms_and_duplicates_are_harmless() {
        let (_, state) = test_state();
        let id = pending_booking(&state).await;

        for _ in 0..2 {
            let status = handle_payment_webhook(
                State(state.clone()),
                Json(PaymentWebhook {
                    event_type: "payment.succeeded".to_string(),
                    payment_ref: "pay_1".to_string(),
                    booking_id: id,
                }),
            )
            .await
            .unwrap();
            assert_eq!(status, StatusCode::OK);
        }

        let booking = state.bookings.get(id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(state.coins.balance("user-1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn failed_event_cancels_and_duplicates_are_harmless() {
        let (_, state) = test_state();
        let id = pending_booking(&state).await;

        for _ in 0..2 {
            let status = handle_payment_webhook(
                State(state.clone()),
                Json(PaymentWebhook {
                    event_type: "payment.failed".to_string(),
                    payment_ref: "pay_1".to_string(),
                    booking_id: id,
                }),
            )
            .await
            .unwrap();
            assert_eq!(status, StatusCode::OK);
        }

        let booking = state.bookings.get(id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn late_failure_after_confirmation_is_acknowledged() {
        let (_, state) = test_state();
        let id = pending_booking(&state).await;

        handle_payment_webhook(
            State(state.clone()),
            Json(PaymentWebhook {
                event_type: "payment.succeeded".to_string(),
                payment_ref: "pay_1".to_string(),
                booking_id: id,
            }),
        )
        .await
        .unwrap();

        // Delayed failure delivery for the same payment; the gateway must get
        // a 200 or it retries forever.
        let status = handle_payment_webhook(
            State(state.clone()),
            Json(PaymentWebhook {
                event_type: "payment.failed".to_string(),
                payment_ref: "pay_1".to_string(),
                booking_id: id,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);

        let booking = state.bookings.get(id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged_and_ignored() {
        let (_, state) = test_state();
        let id = pending_booking(&state).await;

        let status = handle_payment_webhook(
            State(state.clone()),
            Json(PaymentWebhook {
                event_type: "payment.requires_action".to_string(),
                payment_ref: "pay_1".to_string(),
                booking_id: id,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);

        let booking = state.bookings.get(id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
    }
}
