use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

/// Tunables for the reservation core. Values mirror production defaults:
/// 5 minute lease TTL, 15 minute checkout window, 60s reaper cadence,
/// a 4-seat cap per claim and a flat 50-coin reward.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_seconds: u64,
    #[serde(default = "default_max_seats")]
    pub max_seats_per_claim: u32,
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout_seconds: u64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    #[serde(default = "default_reward_coins")]
    pub reward_coins: i64,
    /// Service fee in basis points of the seat subtotal.
    #[serde(default = "default_service_fee_bps")]
    pub service_fee_bps: u32,
}

fn default_lease_ttl() -> u64 {
    300
}
fn default_max_seats() -> u32 {
    4
}
fn default_pending_timeout() -> u64 {
    900
}
fn default_reaper_interval() -> u64 {
    60
}
fn default_reward_coins() -> i64 {
    50
}
fn default_service_fee_bps() -> u32 {
    500
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            lease_ttl_seconds: default_lease_ttl(),
            max_seats_per_claim: default_max_seats(),
            pending_timeout_seconds: default_pending_timeout(),
            reaper_interval_seconds: default_reaper_interval(),
            reward_coins: default_reward_coins(),
            service_fee_bps: default_service_fee_bps(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("YATRI").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
