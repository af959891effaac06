use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yatri_api::{
    app,
    state::{AppState, AuthConfig},
};
use yatri_domain::{BookingStore, CoinLedger, LeaseStore};
use yatri_engine::{BookingService, ChangeFeed, CoinService, ExpiryReaper, SeatLockManager};
use yatri_store::{DbClient, EventProducer, PgStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yatri_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = yatri_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Yatri API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store = Arc::new(PgStore::new(db.pool.clone()));
    let leases: Arc<dyn LeaseStore> = store.clone();
    let bookings: Arc<dyn BookingStore> = store.clone();
    let ledger: Arc<dyn CoinLedger> = store.clone();

    // The feed works without Kafka; the mirror is best-effort.
    let mut feed = ChangeFeed::new(256);
    match EventProducer::new(&config.kafka.brokers) {
        Ok(producer) => feed = feed.with_kafka(Arc::new(producer)),
        Err(e) => tracing::warn!("Kafka producer unavailable, feed is in-process only: {}", e),
    }

    let rules = config.business_rules.clone();
    let lock_manager = Arc::new(SeatLockManager::new(
        leases.clone(),
        bookings.clone(),
        feed.clone(),
        rules.clone(),
    ));
    let booking_service = Arc::new(BookingService::new(
        bookings.clone(),
        feed.clone(),
        rules.clone(),
    ));
    let coin_service = Arc::new(CoinService::new(ledger));

    ExpiryReaper::new(leases, bookings, feed.clone(), rules.clone()).spawn();

    let app_state = AppState {
        locks: lock_manager,
        bookings: booking_service,
        coins: coin_service,
        feed,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        business_rules: rules,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
