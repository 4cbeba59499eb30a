use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUEUE_KEY: &str = "webhook_queue";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub webhook_queue_key: String,
    pub midtrans_server_key: Option<String>,
    pub midtrans_base_url: String,
    pub xendit_api_key: Option<String>,
    pub xendit_callback_token: Option<String>,
    pub xendit_base_url: String,
    pub enable_mock_gateway: bool,
    pub webhook: WebhookConfig,
    pub notification_store_timeout_secs: u64,
    pub log_format: LogFormat,
}

/// Delivery settings for the merchant webhook dispatcher.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub max_retries: u32,
    pub retry_unit_secs: u64,
    pub timeout_secs: u64,
    pub retry_poll_interval_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_unit_secs: 5,
            timeout_secs: 10,
            retry_poll_interval_ms: 500,
        }
    }
}

impl WebhookConfig {
    pub fn retry_unit(&self) -> Duration {
        Duration::from_secs(self.retry_unit_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.retry_poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let defaults = WebhookConfig::default();

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 3000)?,
            // Only `serve` and `db` need Postgres; they reject an empty URL.
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            webhook_queue_key: env::var("WEBHOOK_QUEUE_KEY")
                .unwrap_or_else(|_| DEFAULT_QUEUE_KEY.to_string()),
            midtrans_server_key: non_empty("MIDTRANS_SERVER_KEY"),
            midtrans_base_url: env::var("MIDTRANS_BASE_URL")
                .unwrap_or_else(|_| "https://app.sandbox.midtrans.com".to_string()),
            xendit_api_key: non_empty("XENDIT_API_KEY"),
            xendit_callback_token: non_empty("XENDIT_CALLBACK_TOKEN"),
            xendit_base_url: env::var("XENDIT_BASE_URL")
                .unwrap_or_else(|_| "https://api.xendit.co".to_string()),
            enable_mock_gateway: parse_or("ENABLE_MOCK_GATEWAY", false)?,
            webhook: WebhookConfig {
                max_retries: parse_or("WEBHOOK_MAX_RETRIES", defaults.max_retries)?,
                retry_unit_secs: parse_or("WEBHOOK_RETRY_UNIT_SECS", defaults.retry_unit_secs)?,
                timeout_secs: parse_or("WEBHOOK_TIMEOUT_SECS", defaults.timeout_secs)?,
                retry_poll_interval_ms: parse_or(
                    "WEBHOOK_RETRY_POLL_MS",
                    defaults.retry_poll_interval_ms,
                )?,
            },
            notification_store_timeout_secs: parse_or("NOTIFICATION_STORE_TIMEOUT_SECS", 5)?,
            log_format: parse_or("LOG_FORMAT", LogFormat::Pretty)?,
        })
    }

    pub fn notification_store_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_store_timeout_secs)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/paygate_test".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            webhook_queue_key: DEFAULT_QUEUE_KEY.to_string(),
            midtrans_server_key: None,
            midtrans_base_url: "https://app.sandbox.midtrans.com".to_string(),
            xendit_api_key: None,
            xendit_callback_token: None,
            xendit_base_url: "https://api.xendit.co".to_string(),
            enable_mock_gateway: false,
            webhook: WebhookConfig::default(),
            notification_store_timeout_secs: 5,
            log_format: LogFormat::Pretty,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        Err(_) => Ok(default),
    }
}
