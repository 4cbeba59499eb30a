use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::queue::{RedisWebhookQueue, WebhookQueue};

#[derive(Parser)]
#[command(name = "paygate-core")]
#[command(about = "Paygate Core - Payment Notification Processor and Webhook Dispatcher", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Start the merchant webhook worker
    Worker,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Webhook queue maintenance
    #[command(subcommand)]
    Webhook(WebhookCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum WebhookCommands {
    /// List webhook tasks that exhausted their retries
    DeadLetters {
        /// Maximum number of tasks to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Move every dead-lettered task back onto the queue with a fresh retry budget
    RequeueDead,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Redis URL: {}", mask_password(&config.redis_url));
    println!("  Webhook Queue: {}", config.webhook_queue_key);
    println!("  Midtrans: {}", configured(config.midtrans_server_key.is_some()));
    println!("  Xendit: {}", configured(config.xendit_callback_token.is_some()));
    println!("  Mock Gateway: {}", if config.enable_mock_gateway { "enabled" } else { "disabled" });
    println!(
        "  Webhook Retries: {} (unit {}s, timeout {}s)",
        config.webhook.max_retries, config.webhook.retry_unit_secs, config.webhook.timeout_secs
    );

    crate::startup::validate_env_vars(config)?;

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");
    Ok(())
}

pub async fn handle_dead_letters(config: &Config, limit: usize) -> anyhow::Result<()> {
    let queue = RedisWebhookQueue::connect(&config.redis_url, &config.webhook_queue_key).await?;
    let tasks = queue.dead_letters(limit).await?;

    if tasks.is_empty() {
        println!("No dead-lettered webhooks");
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<9} {:<8} {}",
        "Transaction", "Order", "Status", "Retries", "Callback URL"
    );
    println!("{}", "-".repeat(100));
    for task in tasks {
        println!(
            "{:<38} {:<24} {:<9} {:<8} {}",
            task.transaction_id, task.order_id, task.status, task.retry_count, task.callback_url
        );
    }

    Ok(())
}

pub async fn handle_requeue_dead(config: &Config) -> anyhow::Result<()> {
    let queue = RedisWebhookQueue::connect(&config.redis_url, &config.webhook_queue_key).await?;
    let moved = queue.requeue_dead_letters().await?;

    println!("✓ Requeued {} webhook task(s)", moved);
    Ok(())
}

fn configured(yes: bool) -> &'static str {
    if yes {
        "configured"
    } else {
        "not configured"
    }
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
