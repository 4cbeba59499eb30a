use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use paygate_core::adapters::{PostgresMerchantRepository, PostgresTransactionRepository};
use paygate_core::cli::{self, Cli, Commands, DbCommands, WebhookCommands};
use paygate_core::config::Config;
use paygate_core::gateways::GatewayRegistry;
use paygate_core::ports::{MerchantRepository, TransactionRepository};
use paygate_core::queue::{RedisWebhookQueue, WebhookQueue};
use paygate_core::services::{NotificationProcessor, WebhookDispatcher};
use paygate_core::use_cases::CreateTransaction;
use paygate_core::{create_app, db, startup, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    telemetry::init(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Worker => worker(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Webhook(WebhookCommands::DeadLetters { limit }) => {
            cli::handle_dead_letters(&config, limit).await
        }
        Commands::Webhook(WebhookCommands::RequeueDead) => cli::handle_requeue_dead(&config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let report = startup::validate_environment(&config, &pool).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }

    let queue: Arc<dyn WebhookQueue> = Arc::new(
        RedisWebhookQueue::connect(&config.redis_url, &config.webhook_queue_key).await?,
    );
    let gateways = Arc::new(GatewayRegistry::from_config(&config));
    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let merchants: Arc<dyn MerchantRepository> =
        Arc::new(PostgresMerchantRepository::new(pool.clone()));

    let processor = Arc::new(NotificationProcessor::new(
        gateways.clone(),
        transactions.clone(),
        merchants.clone(),
        queue,
        config.notification_store_timeout(),
    ));
    let create_transaction = Arc::new(CreateTransaction::new(
        gateways,
        transactions.clone(),
        merchants,
    ));

    let app = create_app(AppState {
        db: pool,
        redis_url: config.redis_url.clone(),
        processor,
        create_transaction,
        transactions,
        start_time: Instant::now(),
    });

    let shutdown = shutdown_token();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn worker(config: Config) -> anyhow::Result<()> {
    startup::validate_worker_env(&config)?;

    let queue: Arc<dyn WebhookQueue> = Arc::new(
        RedisWebhookQueue::connect(&config.redis_url, &config.webhook_queue_key).await?,
    );
    let dispatcher = Arc::new(WebhookDispatcher::from_config(queue, &config.webhook));

    dispatcher.run(shutdown_token()).await;
    Ok(())
}

/// Cancelled on Ctrl-C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        trigger.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
