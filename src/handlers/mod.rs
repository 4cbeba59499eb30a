pub mod notifications;
pub mod transactions;

use crate::health::{check_health, PostgresChecker, RedisChecker};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let postgres = PostgresChecker::new(state.db.clone());
    let redis = RedisChecker::new(state.redis_url.clone());

    let health = check_health(&postgres, &redis, state.start_time).await;

    // 503 only when a critical dependency is down
    let status_code = if health.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(health))
}
