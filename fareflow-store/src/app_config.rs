use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub distribution: DistributionConfig,
    pub business_rules: BusinessRules,
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
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

/// Where the flight-distribution API lives.
#[derive(Debug, Deserialize, Clone)]
pub struct DistributionConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Dwell between confirmation steps. The pacing is deliberate; shrink it
    /// only in tests.
    #[serde(default = "default_step_dwell_ms")]
    pub step_dwell_ms: u64,
    /// How long the success step stays on screen before the session closes.
    #[serde(default = "default_success_linger_ms")]
    pub success_linger_ms: u64,
    #[serde(default = "default_poll_seconds")]
    pub instant_issue_poll_seconds: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
    /// Recorded as the author of booking records.
    #[serde(default = "default_created_by")]
    pub created_by: String,
}

fn default_step_dwell_ms() -> u64 {
    1000
}

fn default_success_linger_ms() -> u64 {
    2000
}

fn default_poll_seconds() -> u64 {
    15
}

fn default_rate_limit() -> i64 {
    100
}

fn default_created_by() -> String {
    "fareflow-web".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment variables with a FAREFLOW prefix, e.g.
            // FAREFLOW__SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("FAREFLOW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
