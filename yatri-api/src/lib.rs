use axum::{http::Method, routing::post, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod error;
pub mod seats;
pub mod state;
pub mod wallet;
pub mod webhooks;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Webhooks authenticate via the provider's delivery, not a user token.
    let authed = Router::new()
        .merge(seats::routes())
        .merge(bookings::routes())
        .merge(wallet::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let v1 = Router::new()
        .merge(auth::routes())
        .merge(authed)
        .route("/webhooks/payments", post(webhooks::handle_payment_webhook));

    Router::new()
        .nest("/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
