use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use yatri_domain::EngineError;

#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    AuthenticationError(String),
    AuthorizationError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Engine(err) => {
                let status = match &err {
                    EngineError::SeatConflict { .. } | EngineError::LeaseExpired { .. } => {
                        StatusCode::CONFLICT
                    }
                    EngineError::InvalidClaim(_) => StatusCode::BAD_REQUEST,
                    EngineError::BusNotFound(_) | EngineError::BookingNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    EngineError::InvalidTransition { .. }
                    | EngineError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("storage failure: {}", err);
                    (status, json!({ "error": "Internal Server Error" }))
                } else {
                    // Conflicting seat sets ride along so the client can
                    // highlight them.
                    let body = match &err {
                        EngineError::SeatConflict { seats }
                        | EngineError::LeaseExpired { seats } => {
                            json!({ "error": err.to_string(), "conflicts": seats })
                        }
                        _ => json!({ "error": err.to_string() }),
                    };
                    (status, body)
                }
            }
            AppError::AuthenticationError(msg) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": msg }))
            }
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
