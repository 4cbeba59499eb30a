use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {}", e));
    }

    Ok(report)
}

/// Upper bound for the retry unit: one day.
pub const MAX_RETRY_UNIT_SECS: u64 = 24 * 60 * 60;

/// Checks for the HTTP service.
pub fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    validate_worker_env(config)?;
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.midtrans_server_key.is_none()
        && config.xendit_callback_token.is_none()
        && !config.enable_mock_gateway
    {
        anyhow::bail!("No payment gateway configured");
    }

    url::Url::parse(&config.midtrans_base_url).context("MIDTRANS_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.xendit_base_url).context("XENDIT_BASE_URL is not a valid URL")?;

    Ok(())
}

/// Checks for the webhook worker, which needs only Redis and delivery settings.
pub fn validate_worker_env(config: &Config) -> Result<()> {
    if config.redis_url.is_empty() {
        anyhow::bail!("REDIS_URL is empty");
    }
    if config.webhook_queue_key.trim().is_empty() {
        anyhow::bail!("WEBHOOK_QUEUE_KEY is empty");
    }
    if config.webhook.retry_unit_secs == 0 {
        anyhow::bail!("WEBHOOK_RETRY_UNIT_SECS must be greater than 0");
    }
    if config.webhook.retry_unit_secs > MAX_RETRY_UNIT_SECS {
        anyhow::bail!(
            "WEBHOOK_RETRY_UNIT_SECS must be at most {}",
            MAX_RETRY_UNIT_SECS
        );
    }
    if config.webhook.timeout_secs == 0 {
        anyhow::bail!("WEBHOOK_TIMEOUT_SECS must be greater than 0");
    }
    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}
