use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;

use crate::{auth::Claims, error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/wallet", get(wallet))
}

/// GET /v1/wallet
/// Current coin balance plus the ledger history, newest first.
async fn wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let balance = state.coins.balance(&claims.sub).await?;
    let entries = state.coins.entries(&claims.sub).await?;
    Ok(Json(json!({ "balance": balance, "entries": entries })))
}
