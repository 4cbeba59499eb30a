//! Midtrans: SHA-512 keyed-hash notifications and Snap payment creation.

use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha512};

use super::{GatewayError, PaymentGateway, PaymentRequest, PaymentResponse};
use crate::domain::{MappedStatus, Notification};

pub const PROVIDER: &str = "midtrans";

#[derive(Clone)]
pub struct MidtransGateway {
    client: Client,
    base_url: String,
    server_key: String,
}

#[derive(Debug, Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enabled_payments: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: Option<String>,
}

impl MidtransGateway {
    pub fn new(client: Client, base_url: String, server_key: String) -> Self {
        Self {
            client,
            base_url,
            server_key,
        }
    }
}

/// Lower-hex SHA-512 of `order_id + status_code + gross_amount + server_key`.
pub fn compute_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Renders `gross_amount` the way it was signed. Strings are taken verbatim;
/// integral numbers lose their fractional part.
fn gross_amount_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()) {
                Some(format!("{}", f as i64))
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn verify_signature(&self, notification: &Notification) -> bool {
        let Some(signature) = notification.str_field("signature_key") else {
            return false;
        };
        let Some(order_id) = notification.str_field("order_id") else {
            return false;
        };
        let status_code = notification.str_field("status_code").unwrap_or_default();
        let Some(gross_amount) = notification.field("gross_amount").and_then(gross_amount_text)
        else {
            return false;
        };

        let expected = compute_signature(order_id, status_code, &gross_amount, &self.server_key);
        signature.eq_ignore_ascii_case(&expected)
    }

    fn order_id<'a>(&self, notification: &'a Notification) -> Option<&'a str> {
        notification.str_field("order_id")
    }

    fn map_status(&self, notification: &Notification) -> MappedStatus {
        map_status(
            notification.str_field("transaction_status"),
            notification.str_field("fraud_status"),
        )
    }

    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResponse, GatewayError> {
        if self.server_key.is_empty() {
            return Err(GatewayError::NotConfigured(
                "midtrans server key is empty".to_string(),
            ));
        }

        let gross_amount = request.amount.round(0).to_i64().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("amount {} out of range", request.amount))
        })?;

        let body = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &request.order_id,
                gross_amount,
            },
            enabled_payments: request.payment_method.as_deref().into_iter().collect(),
        };

        let url = format!(
            "{}/snap/v1/transactions",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.server_key, Some(""))
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

        let snap = response.json::<SnapResponse>().await?;
        Ok(PaymentResponse {
            external_ref: snap.token,
            payment_url: snap.redirect_url,
        })
    }
}

/// Midtrans `transaction_status` (with `fraud_status`) to internal status.
pub fn map_status(transaction_status: Option<&str>, fraud_status: Option<&str>) -> MappedStatus {
    match transaction_status {
        Some("capture") => match fraud_status {
            Some("challenge") => MappedStatus::Pending,
            Some("deny") => MappedStatus::Failed,
            _ => MappedStatus::Paid,
        },
        Some("settlement") => MappedStatus::Paid,
        Some("pending") => MappedStatus::Pending,
        Some("deny") | Some("cancel") | Some("failure") => MappedStatus::Failed,
        Some("expire") => MappedStatus::Expired,
        _ => MappedStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use serde_json::json;

    const SERVER_KEY: &str = "SB-Mid-server-test";

    fn gateway(base_url: &str) -> MidtransGateway {
        MidtransGateway::new(Client::new(), base_url.to_string(), SERVER_KEY.to_string())
    }

    fn signed(order_id: &str, status_code: &str, gross: Value, status: &str) -> Notification {
        let gross_text = gross_amount_text(&gross).unwrap();
        let signature = compute_signature(order_id, status_code, &gross_text, SERVER_KEY);
        Notification::new(json!({
            "order_id": order_id,
            "status_code": status_code,
            "gross_amount": gross,
            "transaction_status": status,
            "signature_key": signature,
        }))
    }

    #[test]
    fn test_compute_signature_known_vector() {
        // SHA-512("abc")
        assert_eq!(
            compute_signature("a", "b", "c", ""),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_valid_signature_verifies() {
        let n = signed("ORD-1", "200", json!("10000.00"), "settlement");
        assert!(gateway("http://unused").verify_signature(&n));
    }

    #[test]
    fn test_signature_comparison_ignores_case() {
        let mut n = signed("ORD-1", "200", json!("10000.00"), "settlement");
        let upper = n.str_field("signature_key").unwrap().to_uppercase();
        n.payload["signature_key"] = json!(upper);
        assert!(gateway("http://unused").verify_signature(&n));
    }

    #[test]
    fn test_numeric_gross_amount_verifies() {
        let n = signed("ORD-2", "201", json!(15000), "pending");
        assert!(gateway("http://unused").verify_signature(&n));

        let text = gross_amount_text(&json!(15000.0)).unwrap();
        assert_eq!(text, "15000");
    }

    #[test]
    fn test_tampered_payload_fails() {
        let mut n = signed("ORD-1", "200", json!("10000.00"), "settlement");
        n.payload["gross_amount"] = json!("1.00");
        assert!(!gateway("http://unused").verify_signature(&n));
    }

    #[test]
    fn test_missing_signature_fails() {
        let mut n = signed("ORD-1", "200", json!("10000.00"), "settlement");
        n.payload.as_object_mut().unwrap().remove("signature_key");
        assert!(!gateway("http://unused").verify_signature(&n));
    }

    #[test]
    fn test_wrong_server_key_fails() {
        let n = signed("ORD-1", "200", json!("10000.00"), "settlement");
        let other = MidtransGateway::new(
            Client::new(),
            "http://unused".to_string(),
            "another-key".to_string(),
        );
        assert!(!other.verify_signature(&n));
    }

    #[test]
    fn test_status_mapping_vocabulary() {
        let cases = [
            (Some("capture"), None, MappedStatus::Paid),
            (Some("capture"), Some("accept"), MappedStatus::Paid),
            (Some("capture"), Some("challenge"), MappedStatus::Pending),
            (Some("capture"), Some("deny"), MappedStatus::Failed),
            (Some("settlement"), None, MappedStatus::Paid),
            (Some("pending"), None, MappedStatus::Pending),
            (Some("deny"), None, MappedStatus::Failed),
            (Some("cancel"), None, MappedStatus::Failed),
            (Some("failure"), None, MappedStatus::Failed),
            (Some("expire"), None, MappedStatus::Expired),
        ];
        for (status, fraud, expected) in cases {
            assert_eq!(map_status(status, fraud), expected, "{status:?}/{fraud:?}");
        }
    }

    #[test]
    fn test_unrecognized_status_is_never_paid() {
        for raw in [Some("refund"), Some("authorize"), Some("SETTLEMENT"), Some(""), None] {
            assert_eq!(map_status(raw, None), MappedStatus::Unknown);
        }
    }

    #[tokio::test]
    async fn test_create_payment_with_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/snap/v1/transactions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "transaction_details": {"order_id": "ORD-9", "gross_amount": 50000}
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"snap-token","redirect_url":"https://app.midtrans.test/pay"}"#)
            .create_async()
            .await;

        let request = PaymentRequest {
            order_id: "ORD-9".to_string(),
            amount: BigDecimal::from(50000),
            currency: "IDR".to_string(),
            payment_method: None,
        };
        let response = gateway(&server.url()).create_payment(&request).await.unwrap();

        assert_eq!(response.external_ref, "snap-token");
        assert_eq!(
            response.payment_url.as_deref(),
            Some("https://app.midtrans.test/pay")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_payment_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/snap/v1/transactions")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let request = PaymentRequest {
            order_id: "ORD-10".to_string(),
            amount: BigDecimal::from(1000),
            currency: "IDR".to_string(),
            payment_method: Some("qris".to_string()),
        };
        let err = gateway(&server.url()).create_payment(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 401, .. }));
    }
}
