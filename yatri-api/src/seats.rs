use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;

use yatri_domain::ClaimOutcome;

use crate::{auth::Claims, error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct ClaimRequest {
    seats: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/buses/{bus_id}/seats/claim", post(claim_seats))
        .route("/buses/{bus_id}/seats/claim", delete(release_seats))
        .route("/buses/{bus_id}/seats", get(seat_map))
        .route("/buses/{bus_id}/stream", get(stream_changes))
}

/// POST /v1/buses/{bus_id}/seats/claim
/// All-or-nothing lease on the requested seats. A repeat claim by the same
/// holder renews the expiry. Losing the race is a 409 that names every
/// contested seat.
async fn claim_seats(
    State(state): State<AppState>,
    Path(bus_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.locks.claim(bus_id, &req.seats, &claims.sub, None).await?;

    let response = match outcome {
        ClaimOutcome::Granted(leases) => (
            StatusCode::OK,
            Json(json!({
                "status": "granted",
                "expires_at": leases.first().map(|l| l.expires_at),
                "leases": leases,
            })),
        ),
        ClaimOutcome::Conflict(conflicts) => (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "conflict",
                "conflicts": conflicts,
            })),
        ),
    };
    Ok(response)
}

/// DELETE /v1/buses/{bus_id}/seats/claim
/// Drop every lease the caller holds on the bus. Safe to repeat.
async fn release_seats(
    State(state): State<AppState>,
    Path(bus_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, AppError> {
    state.locks.release(bus_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/buses/{bus_id}/seats
/// Per-seat status as seen by the caller. Seats absent from the map are
/// available.
async fn seat_map(
    State(state): State<AppState>,
    Path(bus_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let map = state.locks.seat_status_map(bus_id, &claims.sub).await?;
    Ok(Json(json!({ "bus_id": bus_id, "seats": map })))
}

/// GET /v1/buses/{bus_id}/stream
/// Live lease/booking mutations for one bus as server-sent events. A
/// subscriber that falls behind the broadcast buffer silently loses the
/// gap; clients refetch the seat map on reconnect.
async fn stream_changes(
    State(state): State<AppState>,
    Path(bus_id): Path<i64>,
    Extension(_claims): Extension<Claims>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.feed.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.bus_id == bus_id => Event::default()
                .event(event.topic())
                .json_data(&event)
                .ok()
                .map(Ok),
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
