use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use yatri_domain::Booking;

use crate::{auth::Claims, error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    bus_id: i64,
    seats: Vec<String>,
    passenger_details: serde_json::Value,
    contact_info: serde_json::Value,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
}

/// POST /v1/bookings
/// Convert the caller's leases into a `pending` booking. The seats stop
/// depending on lease renewal the moment this returns 201.
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state
        .bookings
        .create_pending(
            req.bus_id,
            &req.seats,
            &claims.sub,
            req.passenger_details,
            req.contact_info,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Booking>, AppError> {
    let booking = owned_booking(&state, id, &claims).await?;
    Ok(Json(booking))
}

/// POST /v1/bookings/{id}/cancel
/// User-initiated cancellation of a pending booking. Frees the seats.
async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Booking>, AppError> {
    owned_booking(&state, id, &claims).await?;
    let booking = state.bookings.cancel(id).await?;
    Ok(Json(booking))
}

async fn owned_booking(state: &AppState, id: Uuid, claims: &Claims) -> Result<Booking, AppError> {
    let booking = state.bookings.get(id).await?;
    if booking.user_id != claims.sub {
        return Err(AppError::AuthorizationError(
            "booking belongs to another user".to_string(),
        ));
    }
    Ok(booking)
}
