use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::info;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "orderflow:rl";
const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";
const DEFAULT_SMS_API_URL: &str = "https://api.twilio.com/2010-04-01";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_only_secret_key_do_not_use_in_production";

/// Payment-gateway (hosted redirect checkout) settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// API key; the gateway integration is disabled when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Secret key used for request signing.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Gateway base URL.
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    /// Public URL the gateway redirects/calls back to after checkout.
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Frontend URL the callback handler redirects the browser to. When
    /// absent, the callback answers with a neutral acknowledgement.
    #[serde(default)]
    pub success_redirect_url: Option<String>,
    /// Per-call timeout; a timed-out gateway call is treated as failure.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_gateway_locale")]
    pub locale: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            secret_key: None,
            base_url: default_gateway_base_url(),
            callback_url: None,
            success_redirect_url: None,
            timeout_secs: default_gateway_timeout_secs(),
            locale: default_gateway_locale(),
        }
    }
}

/// Webhook receiver authenticity settings. Each source verifies either an
/// HMAC signature (secret) or a legacy shared token; unset means that
/// mechanism is unavailable for the source.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default)]
    pub shipping_secret: Option<String>,
    #[serde(default)]
    pub shipping_token: Option<String>,
    #[serde(default)]
    pub returns_secret: Option<String>,
    #[serde(default)]
    pub returns_token: Option<String>,
    /// Allowed clock skew for the optional x-timestamp replay check.
    #[serde(default = "default_webhook_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            shipping_secret: None,
            shipping_token: None,
            returns_secret: None,
            returns_token: None,
            timestamp_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

/// Reconciliation housekeeper grace windows. "Has token" is stronger
/// payment-intent evidence than "no token", hence the asymmetric windows.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct HousekeepingConfig {
    /// Pending orders older than this with no gateway token are cancelled.
    #[serde(default = "default_abandoned_after_mins")]
    pub abandoned_after_mins: i64,
    /// Pending orders older than this with a token get one re-resolution.
    #[serde(default = "default_reconcile_after_mins")]
    pub reconcile_after_mins: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_batch_limit")]
    pub batch_limit: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            abandoned_after_mins: default_abandoned_after_mins(),
            reconcile_after_mins: default_reconcile_after_mins(),
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_limit: default_sweep_batch_limit(),
        }
    }
}

/// Notification channel credentials. A channel with missing credentials
/// degrades to "disabled" and never blocks the pipeline.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default = "default_email_api_url")]
    pub email_api_url: String,
    #[serde(default)]
    pub email_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    #[serde(default = "default_sms_api_url")]
    pub sms_api_url: String,
    #[serde(default)]
    pub sms_account_sid: Option<String>,
    #[serde(default)]
    pub sms_auth_token: Option<String>,
    #[serde(default)]
    pub sms_from_number: Option<String>,
    /// Incoming-webhook URL for the chat channel.
    #[serde(default)]
    pub chat_webhook_url: Option<String>,
    /// Comma-separated recipients for stock-threshold alerts.
    #[serde(default)]
    pub alert_recipients: Option<String>,
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            email_api_url: default_email_api_url(),
            email_api_key: None,
            email_from: default_email_from(),
            sms_api_url: default_sms_api_url(),
            sms_account_sid: None,
            sms_auth_token: None,
            sms_from_number: None,
            chat_webhook_url: None,
            alert_recipients: None,
            timeout_secs: default_notification_timeout_secs(),
        }
    }
}

/// Application configuration. One object, enumerated options, explicit
/// defaults; loaded from config files with an environment overlay.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// HS256 secret for caller bearer tokens (refund authorization).
    #[validate(length(min = 32))]
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Whether to run embedded migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Order amount currency (ISO 4217), declared to the gateway.
    #[serde(default = "default_currency")]
    pub currency: String,

    // DB pool tuning
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    // Rate limiting (mutation endpoints)
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,
    #[serde(default = "default_true")]
    pub rate_limit_enable_headers: bool,
    /// Path policies: comma-separated `prefix:limit:window_secs`.
    #[serde(default)]
    pub rate_limit_path_policies: Option<String>,
    #[serde(default)]
    pub rate_limit_use_redis: bool,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_rate_limit_namespace")]
    pub rate_limit_namespace: String,

    /// Event channel capacity for async notification dispatch
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    #[validate]
    pub webhooks: WebhookConfig,

    #[serde(default)]
    #[validate]
    pub housekeeping: HousekeepingConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_jwt_secret() -> String {
    DEV_DEFAULT_JWT_SECRET.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_rate_limit_requests() -> u32 {
    DEFAULT_RATE_LIMIT_REQUESTS
}
fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}
fn default_rate_limit_namespace() -> String {
    DEFAULT_RATE_LIMIT_NAMESPACE.to_string()
}
fn default_true() -> bool {
    true
}
fn default_event_channel_capacity() -> usize {
    256
}
fn default_gateway_base_url() -> String {
    "https://sandbox-api.gateway.example".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    10
}
fn default_gateway_locale() -> String {
    "en".to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    300
}
fn default_abandoned_after_mins() -> i64 {
    30
}
fn default_reconcile_after_mins() -> i64 {
    15
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_sweep_batch_limit() -> u64 {
    1000
}
fn default_email_api_url() -> String {
    DEFAULT_EMAIL_API_URL.to_string()
}
fn default_email_from() -> String {
    "Orders <noreply@orderflow.example>".to_string()
}
fn default_sms_api_url() -> String {
    DEFAULT_SMS_API_URL.to_string()
}
fn default_notification_timeout_secs() -> u64 {
    5
}

impl AppConfig {
    /// Minimal constructor for tests and embedding; everything else takes
    /// its documented default.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            jwt_secret: default_jwt_secret(),
            auto_migrate: false,
            currency: default_currency(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            rate_limit_requests_per_window: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_secs(),
            rate_limit_enable_headers: true,
            rate_limit_path_policies: None,
            rate_limit_use_redis: false,
            redis_url: None,
            rate_limit_namespace: default_rate_limit_namespace(),
            event_channel_capacity: default_event_channel_capacity(),
            gateway: GatewayConfig::default(),
            webhooks: WebhookConfig::default(),
            housekeeping: HousekeepingConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads configuration from `config/default`, `config/<env>` (both optional)
/// and the `APP_*` environment overlay (`APP_GATEWAY__API_KEY` style for
/// nested sections), then validates it.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(
        environment = %app_config.environment,
        port = app_config.port,
        "configuration loaded"
    );

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::new("sqlite::memory:");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.housekeeping.abandoned_after_mins, 30);
        assert_eq!(cfg.housekeeping.reconcile_after_mins, 15);
        assert!(cfg.housekeeping.abandoned_after_mins > cfg.housekeeping.reconcile_after_mins);
        assert_eq!(cfg.webhooks.timestamp_tolerance_secs, 300);
        assert!(!cfg.is_production());
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }
}
