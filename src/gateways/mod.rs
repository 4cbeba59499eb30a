//! Payment provider integrations.
//!
//! Each provider implements [`PaymentGateway`]: signature verification,
//! order-id extraction and status mapping for inbound notifications, plus
//! payment creation. Providers are looked up by name through a
//! [`GatewayRegistry`] that is built once at startup and handed to the
//! notification processor. Adding a provider means adding an implementation
//! and registering it; the processor does not change.

pub mod midtrans;
pub mod mock;
pub mod xendit;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::domain::{MappedStatus, Notification};

pub use midtrans::MidtransGateway;
pub use mock::MockGateway;
pub use xendit::XenditGateway;

const GATEWAY_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Payment to be opened at a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: Option<String>,
}

/// What a provider hands back when a payment is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub external_ref: String,
    pub payment_url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registry key, also the `provider` column of transactions.
    fn name(&self) -> &'static str;

    /// Whether the notification genuinely comes from this provider.
    /// Missing signature material is `false`, never an error.
    fn verify_signature(&self, notification: &Notification) -> bool;

    /// Merchant order id carried by the notification.
    fn order_id<'a>(&self, notification: &'a Notification) -> Option<&'a str>;

    /// Maps the provider's status vocabulary onto the internal one.
    /// Total: unrecognized input yields [`MappedStatus::Unknown`].
    fn map_status(&self, notification: &Notification) -> MappedStatus;

    async fn create_payment(&self, request: &PaymentRequest)
        -> Result<PaymentResponse, GatewayError>;
}

/// Provider name to gateway lookup.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.name().to_string(), gateway);
        self
    }

    /// Registers every provider that has credentials in `config`.
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GATEWAY_HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let mut registry = Self::new();

        if let Some(server_key) = &config.midtrans_server_key {
            registry = registry.with(Arc::new(MidtransGateway::new(
                client.clone(),
                config.midtrans_base_url.clone(),
                server_key.clone(),
            )));
        }

        if let Some(callback_token) = &config.xendit_callback_token {
            registry = registry.with(Arc::new(XenditGateway::new(
                client.clone(),
                config.xendit_base_url.clone(),
                config.xendit_api_key.clone(),
                callback_token.clone(),
            )));
        }

        if config.enable_mock_gateway {
            tracing::warn!("Mock gateway enabled: its notifications are never authenticated");
            registry = registry.with(Arc::new(MockGateway::new()));
        }

        tracing::info!(providers = ?registry.providers(), "Payment gateways registered");
        registry
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(provider).cloned()
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gateways.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
