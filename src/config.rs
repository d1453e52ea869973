use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_OTP_TTL_SECS: u64 = 300;
const DEFAULT_OTP_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_OTP_CODE_LENGTH: u32 = 6;

/// One-time-code policy knobs.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OtpConfig {
    /// Seconds a freshly issued code stays valid.
    #[serde(default = "default_otp_ttl_secs")]
    pub ttl_secs: u64,

    /// Failed comparisons allowed before a code becomes terminally exhausted.
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_otp_max_attempts")]
    pub max_attempts: i32,

    /// Number of digits in a generated code.
    #[validate(range(min = 4, max = 10))]
    #[serde(default = "default_otp_code_length")]
    pub code_length: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_OTP_TTL_SECS,
            max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            code_length: DEFAULT_OTP_CODE_LENGTH,
        }
    }
}

/// Application configuration, loaded from `config/{default,<env>}.toml` with
/// `APP__`-prefixed environment variable overrides layered on top.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// One-time-code policy
    #[serde(default)]
    #[validate]
    pub otp: OtpConfig,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}
fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}
fn default_otp_ttl_secs() -> u64 {
    DEFAULT_OTP_TTL_SECS
}
fn default_otp_max_attempts() -> i32 {
    DEFAULT_OTP_MAX_ATTEMPTS
}
fn default_otp_code_length() -> u32 {
    DEFAULT_OTP_CODE_LENGTH
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads configuration: `config/default.toml`, then the environment-specific
/// file, then `APP__*` environment variables (e.g. `APP__DATABASE_URL`,
/// `APP__OTP__MAX_ATTEMPTS`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }
    let env_path = Path::new(CONFIG_DIR).join(format!("{}.toml", run_env));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let config: AppConfig = builder.build()?.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(config)
}

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// configured level when set and non-empty.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("bazaar_core={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_defaults_are_sane() {
        let otp = OtpConfig::default();
        assert_eq!(otp.max_attempts, 5);
        assert_eq!(otp.code_length, 6);
        assert_eq!(otp.ttl_secs, 300);
    }

    #[test]
    fn otp_attempt_cap_is_validated() {
        let otp = OtpConfig {
            max_attempts: 0,
            ..OtpConfig::default()
        };
        assert!(otp.validate().is_err());
    }
}
