use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CACHE_CAPACITY: usize = 1000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_GEOCODING_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const DEFAULT_DISTANCE_MATRIX_URL: &str =
    "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON (for log aggregation)
    #[serde(default)]
    pub log_json: bool,

    /// Geocoding provider endpoint
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,

    /// Distance-matrix provider endpoint
    #[serde(default = "default_distance_matrix_url")]
    pub distance_matrix_url: String,

    /// Mapping provider API key; required to boot
    #[serde(default)]
    pub maps_api_key: String,

    /// Timeout for each provider call in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Maximum drive-time cache entries held in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Interval between cache/limiter sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Requests allowed per identifier per window
    #[serde(default = "default_rate_limit_requests")]
    #[validate(range(min = 1))]
    pub rate_limit_requests: u32,

    /// Rate-limit window length in seconds
    #[serde(default = "default_rate_limit_window")]
    #[validate(range(min = 1))]
    pub rate_limit_window_secs: u64,

    /// Price floor applied to every calculation
    #[serde(default = "default_minimum_charge")]
    pub minimum_charge: Decimal,

    /// Final-price rounding increment (0.01, 1.00, ...)
    #[serde(default = "default_round_to")]
    pub round_to: Decimal,

    /// How long a calculation result stays quotable, in seconds
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: i64,

    /// Assumed urban average speed for fallback drive-time estimates
    #[serde(default = "default_fallback_speed")]
    #[validate(range(min = 10.0, max = 120.0))]
    pub fallback_speed_kmh: f64,

    /// Multiplier from great-circle to plausible road distance
    #[serde(default = "default_routing_factor")]
    #[validate(range(min = 1.0, max = 3.0))]
    pub routing_factor: f64,

    /// Cap on concurrent in-flight provider calls during batch fan-out
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Optional seed file with shop origins and zones (JSON)
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_geocoding_url() -> String {
    DEFAULT_GEOCODING_URL.to_string()
}
fn default_distance_matrix_url() -> String {
    DEFAULT_DISTANCE_MATRIX_URL.to_string()
}
fn default_provider_timeout() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_rate_limit_requests() -> u32 {
    DEFAULT_RATE_LIMIT_REQUESTS
}
fn default_rate_limit_window() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}
fn default_minimum_charge() -> Decimal {
    Decimal::from(50)
}
fn default_round_to() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_result_ttl() -> i64 {
    3600
}
fn default_fallback_speed() -> f64 {
    40.0
}
fn default_routing_factor() -> f64 {
    1.3
}
fn default_max_concurrent_chunks() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
            geocoding_url: default_geocoding_url(),
            distance_matrix_url: default_distance_matrix_url(),
            maps_api_key: String::new(),
            provider_timeout_secs: default_provider_timeout(),
            cache_capacity: default_cache_capacity(),
            sweep_interval_secs: default_sweep_interval(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window(),
            minimum_charge: default_minimum_charge(),
            round_to: default_round_to(),
            result_ttl_secs: default_result_ttl(),
            fallback_speed_kmh: default_fallback_speed(),
            routing_factor: default_routing_factor(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            seed_file: None,
        }
    }
}

/// Load configuration layered as: `config/default.toml`, then
/// `config/{RUN_MODE}.toml`, then `GEOPRICING_*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_mode)).required(false))
        .add_source(Environment::with_prefix("GEOPRICING"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(app_config)
}

/// Install the global tracing subscriber. Called once at startup.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.minimum_charge, dec!(50));
        assert_eq!(cfg.round_to, dec!(0.01));
        assert_eq!(cfg.rate_limit_requests, 100);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.fallback_speed_kmh = 500.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.rate_limit_requests = 0;
        assert!(cfg.validate().is_err());
    }
}
