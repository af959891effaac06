pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod ledger_repo;
pub mod lease_repo;
pub mod memory;

pub use database::{DbClient, PgStore};
pub use events::EventProducer;
pub use memory::MemoryStore;
