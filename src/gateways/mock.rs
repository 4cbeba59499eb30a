//! Development gateway. Accepts every notification and reads the status
//! from a `mock_status` field.

use async_trait::async_trait;
use uuid::Uuid;

use super::{GatewayError, PaymentGateway, PaymentRequest, PaymentResponse};
use crate::domain::{MappedStatus, Notification};

pub const PROVIDER: &str = "mock";

#[derive(Debug, Clone, Default)]
pub struct MockGateway;

impl MockGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn verify_signature(&self, _notification: &Notification) -> bool {
        true
    }

    fn order_id<'a>(&self, notification: &'a Notification) -> Option<&'a str> {
        notification.str_field("order_id")
    }

    fn map_status(&self, notification: &Notification) -> MappedStatus {
        match notification.str_field("mock_status") {
            None => MappedStatus::Paid,
            Some(raw) => match raw.to_ascii_uppercase().as_str() {
                "PAID" => MappedStatus::Paid,
                "PENDING" => MappedStatus::Pending,
                "FAILED" => MappedStatus::Failed,
                "EXPIRED" => MappedStatus::Expired,
                _ => MappedStatus::Unknown,
            },
        }
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResponse, GatewayError> {
        let id = Uuid::new_v4();
        Ok(PaymentResponse {
            external_ref: format!("mock-{id}"),
            payment_url: Some(format!("https://mock.pay.test/{}/{id}", request.order_id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mock_status_defaults_to_paid() {
        let gw = MockGateway::new();
        assert_eq!(gw.map_status(&Notification::new(json!({}))), MappedStatus::Paid);
        assert_eq!(
            gw.map_status(&Notification::new(json!({"mock_status": "expired"}))),
            MappedStatus::Expired
        );
        assert_eq!(
            gw.map_status(&Notification::new(json!({"mock_status": "bogus"}))),
            MappedStatus::Unknown
        );
    }
}
