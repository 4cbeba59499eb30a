pub mod notification_processor;
pub mod retry_policy;
pub mod webhook_dispatcher;

pub use notification_processor::{IgnoreReason, NotificationProcessor, ProcessOutcome};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use webhook_dispatcher::{DeliveryError, DeliveryOutcome, WebhookDispatcher};
