use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use crate::domain::Notification;
use crate::error::{Envelope, NotificationError};
use crate::services::NotificationProcessor;

/// `POST /webhooks/:provider`
///
/// Always answers 200; the envelope says whether the notification was taken.
pub async fn receive(
    State(processor): State<Arc<NotificationProcessor>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Envelope>, NotificationError> {
    let provider = provider.to_ascii_lowercase();
    let notification = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(Notification::new(payload), |n, (name, value)| {
            n.with_header(name, value)
        });

    match processor.process(&provider, notification).await {
        Ok(outcome) => Ok(Json(Envelope::success(outcome.message()))),
        Err(e) => {
            if e.is_transient() {
                tracing::error!(provider = %provider, error = %e, "Notification processing failed");
            } else {
                tracing::warn!(provider = %provider, error = %e, "Notification rejected");
            }
            Err(e)
        }
    }
}
