use std::sync::Arc;

use yatri_engine::{BookingService, ChangeFeed, CoinService, SeatLockManager};
use yatri_store::app_config::BusinessRules;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub locks: Arc<SeatLockManager>,
    pub bookings: Arc<BookingService>,
    pub coins: Arc<CoinService>,
    pub feed: ChangeFeed,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}
