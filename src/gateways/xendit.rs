//! Xendit: callback-token header authentication and invoice creation.

use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GatewayError, PaymentGateway, PaymentRequest, PaymentResponse};
use crate::domain::{MappedStatus, Notification};

pub const PROVIDER: &str = "xendit";
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

#[derive(Clone)]
pub struct XenditGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    callback_token: String,
}

#[derive(Debug, Serialize)]
struct InvoiceRequest<'a> {
    external_id: &'a str,
    amount: f64,
    currency: &'a str,
    description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    payment_methods: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    id: String,
    invoice_url: Option<String>,
}

impl XenditGateway {
    pub fn new(
        client: Client,
        base_url: String,
        api_key: Option<String>,
        callback_token: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            callback_token,
        }
    }
}

/// Internal payment method names to the Xendit channels that serve them.
fn payment_channels(method: Option<&str>) -> Vec<&'static str> {
    match method {
        Some("credit_card") => vec!["CREDIT_CARD"],
        Some("bank_transfer") => vec!["BNI", "BCA", "MANDIRI", "PERMATA", "BRI"],
        Some("e_wallet") => vec!["OVO", "DANA", "SHOPEEPAY", "LINKAJA"],
        Some("qris") => vec!["QRIS"],
        _ => Vec::new(),
    }
}

#[async_trait]
impl PaymentGateway for XenditGateway {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn verify_signature(&self, notification: &Notification) -> bool {
        if self.callback_token.is_empty() {
            return false;
        }
        notification
            .header(CALLBACK_TOKEN_HEADER)
            .is_some_and(|token| token == self.callback_token)
    }

    fn order_id<'a>(&self, notification: &'a Notification) -> Option<&'a str> {
        notification.str_field("external_id")
    }

    fn map_status(&self, notification: &Notification) -> MappedStatus {
        map_status(notification.str_field("status"))
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResponse, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::NotConfigured("xendit api key is not set".to_string()))?;

        let amount = request.amount.to_f64().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("amount {} out of range", request.amount))
        })?;

        let body = InvoiceRequest {
            external_id: &request.order_id,
            amount,
            currency: &request.currency,
            description: format!("Order {}", request.order_id),
            payment_methods: payment_channels(request.payment_method.as_deref()),
        };

        let url = format!("{}/v2/invoices", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .basic_auth(api_key, Some(""))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let invoice = response.json::<InvoiceResponse>().await?;
        Ok(PaymentResponse {
            external_ref: invoice.id,
            payment_url: invoice.invoice_url,
        })
    }
}

/// Xendit invoice `status` to internal status.
pub fn map_status(status: Option<&str>) -> MappedStatus {
    match status {
        Some("PAID") | Some("SETTLED") => MappedStatus::Paid,
        Some("PENDING") => MappedStatus::Pending,
        Some("EXPIRED") => MappedStatus::Expired,
        Some("FAILED") | Some("CANCELLED") => MappedStatus::Failed,
        _ => MappedStatus::Unknown,
    }
}
