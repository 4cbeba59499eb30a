//! Domain entities shared by the notification and delivery pipelines.

pub mod merchant;
pub mod notification;
pub mod transaction;
pub mod webhook;

pub use merchant::Merchant;
pub use notification::Notification;
pub use transaction::{MappedStatus, Transaction, TransactionStatus};
pub use webhook::{MerchantWebhookBody, WebhookTask};
