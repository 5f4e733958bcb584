use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub paystack: PaystackSettings,
    pub business_rules: BusinessRules,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub seat_hold_seconds: u64,
    pub payment_hold_seconds: u64,
    pub session_idle_seconds: u64,
    #[serde(default = "default_retention_grace")]
    pub session_retention_grace_seconds: u64,
    #[serde(default = "default_compensation_hold")]
    pub compensation_hold_seconds: u64,
    /// Seat surcharges in naira
    pub surcharge_standard: i64,
    pub surcharge_window: i64,
    pub surcharge_front: i64,
    #[serde(default = "default_max_multiplier")]
    pub max_price_multiplier: f64,
    #[serde(default = "default_max_luggage_photos")]
    pub max_luggage_photos: usize,
}

fn default_retention_grace() -> u64 { 1800 }
fn default_compensation_hold() -> u64 { 120 }
fn default_max_multiplier() -> f64 { 5.0 }
fn default_max_luggage_photos() -> usize { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 120 }

/// Leave `url` unset to run on in-memory stores.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

/// An empty `secret_key` selects the mock gateway.
#[derive(Debug, Deserialize, Clone)]
pub struct PaystackSettings {
    #[serde(default)]
    pub secret_key: String,
    pub base_url: String,
    pub callback_url: Option<String>,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
    pub circuit_failure_threshold: usize,
    pub circuit_reset_seconds: u64,
}

fn default_gateway_timeout() -> u64 { 15 }

#[derive(Debug, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub sweep_interval_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. VAAMOOSE__PAYSTACK__SECRET_KEY=sk_live_...
            .add_source(config::Environment::with_prefix("VAAMOOSE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_deserializes() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = s.try_deserialize().unwrap();

        assert_eq!(config.business_rules.surcharge_window, 200);
        assert_eq!(config.business_rules.surcharge_front, 500);
        assert_eq!(config.business_rules.max_luggage_photos, 5);
        assert!(config.database.url.is_none());
        assert!(config.paystack.secret_key.is_empty());
    }
}
