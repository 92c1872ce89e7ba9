use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

const DEFAULT_SHIPPING_FLAT_RATE_CENTS: i64 = 1500; // $15.00
const DEFAULT_FREE_SHIPPING_THRESHOLD_CENTS: i64 = 15000; // $150.00
const DEFAULT_DOWNLOAD_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_MAX_DOWNLOADS_PER_TOKEN: i32 = 5;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 15;

/// Flat-rate shipping with a free-shipping threshold, US-only for v1.
/// Applies only to carts containing at least one physical item.
#[derive(Clone, Debug, Deserialize)]
pub struct ShippingConfig {
    #[serde(default = "default_shipping_flat_rate_cents")]
    pub flat_rate_cents: i64,
    #[serde(default = "default_free_shipping_threshold_cents")]
    pub free_shipping_threshold_cents: i64,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            flat_rate_cents: DEFAULT_SHIPPING_FLAT_RATE_CENTS,
            free_shipping_threshold_cents: DEFAULT_FREE_SHIPPING_THRESHOLD_CENTS,
        }
    }
}

/// Application configuration loaded from `config/*.toml` files and
/// `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL used to build success/cancel redirects and download links
    pub app_url: String,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Stripe API secret key (sk_test_... or sk_live_...)
    #[validate(length(min = 1))]
    pub stripe_secret_key: String,

    /// Stripe publishable key surfaced to the storefront client
    #[serde(default)]
    pub stripe_publishable_key: String,

    /// Stripe webhook signing secret (whsec_...)
    #[validate(length(min = 1))]
    pub stripe_webhook_secret: String,

    /// Maximum accepted age of a signed webhook timestamp
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// Bounded timeout for outbound payment-gateway calls
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    #[serde(default)]
    pub shipping: ShippingConfig,

    /// Directory holding the deliverable digital assets
    #[serde(default = "default_digital_assets_dir")]
    pub digital_assets_dir: String,

    /// Download entitlement lifetime
    #[serde(default = "default_download_token_ttl_days")]
    pub download_token_ttl_days: i64,

    /// Download entitlement usage cap
    #[serde(default = "default_max_downloads_per_token")]
    pub max_downloads_per_token: i32,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_shipping_flat_rate_cents() -> i64 {
    DEFAULT_SHIPPING_FLAT_RATE_CENTS
}

fn default_free_shipping_threshold_cents() -> i64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD_CENTS
}

fn default_digital_assets_dir() -> String {
    "digital-assets".to_string()
}

fn default_download_token_ttl_days() -> i64 {
    DEFAULT_DOWNLOAD_TOKEN_TTL_DAYS
}

fn default_max_downloads_per_token() -> i32 {
    DEFAULT_MAX_DOWNLOADS_PER_TOKEN
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration for the current `RUN_ENV`/`APP_ENV` profile.
///
/// Stripe keys have no defaults; they must come from the environment or a
/// config file so an insecure placeholder never reaches production.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://atelier.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("app_url", "http://localhost:8080")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| AppConfigError::Invalid(e.to_string()))?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("atelier_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
