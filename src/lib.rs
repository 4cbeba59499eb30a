pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod health;
pub mod ports;
pub mod queue;
pub mod services;
pub mod startup;
pub mod telemetry;
pub mod use_cases;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ports::TransactionRepository;
use crate::services::NotificationProcessor;
use crate::use_cases::CreateTransaction;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub redis_url: String,
    pub processor: Arc<NotificationProcessor>,
    pub create_transaction: Arc<CreateTransaction>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub start_time: Instant,
}

/// Provider notification routes. Needs nothing but the processor.
pub fn notification_router(processor: Arc<NotificationProcessor>) -> Router {
    Router::new()
        .route("/webhooks/:provider", post(handlers::notifications::receive))
        .with_state(processor)
}

pub fn create_app(state: AppState) -> Router {
    let processor = state.processor.clone();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions", post(handlers::transactions::create_transaction))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .with_state(state)
        .merge(notification_router(processor))
        .layer(TraceLayer::new_for_http())
}
