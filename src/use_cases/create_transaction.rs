//! Create transaction use case.
//! Opens a payment at the requested provider, then persists it as PENDING.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::Transaction;
use crate::gateways::{GatewayError, GatewayRegistry, PaymentRequest};
use crate::ports::{MerchantRepository, RepositoryError, TransactionRepository};

/// Input for the CreateTransaction use case.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionInput {
    pub merchant_id: Uuid,
    pub order_id: String,
    pub provider: String,
    pub amount: BigDecimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_method: Option<String>,
}

fn default_currency() -> String {
    "IDR".to_string()
}

#[derive(Error, Debug)]
pub enum CreateTransactionError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Merchant not found: {0}")]
    MerchantNotFound(Uuid),

    #[error("Order id already used: {0}")]
    DuplicateOrder(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Use case for opening a payment.
pub struct CreateTransaction {
    gateways: Arc<GatewayRegistry>,
    transactions: Arc<dyn TransactionRepository>,
    merchants: Arc<dyn MerchantRepository>,
}

impl CreateTransaction {
    pub fn new(
        gateways: Arc<GatewayRegistry>,
        transactions: Arc<dyn TransactionRepository>,
        merchants: Arc<dyn MerchantRepository>,
    ) -> Self {
        Self {
            gateways,
            transactions,
            merchants,
        }
    }

    pub async fn execute(
        &self,
        input: CreateTransactionInput,
    ) -> Result<Transaction, CreateTransactionError> {
        let order_id = input.order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(CreateTransactionError::Invalid("order_id is required".to_string()));
        }
        if input.amount <= BigDecimal::from(0) {
            return Err(CreateTransactionError::Invalid(
                "amount must be positive".to_string(),
            ));
        }

        let gateway = self
            .gateways
            .get(&input.provider)
            .ok_or_else(|| CreateTransactionError::UnsupportedProvider(input.provider.clone()))?;

        if self.merchants.find_by_id(input.merchant_id).await?.is_none() {
            return Err(CreateTransactionError::MerchantNotFound(input.merchant_id));
        }

        if self.transactions.find_by_order_id(&order_id).await?.is_some() {
            return Err(CreateTransactionError::DuplicateOrder(order_id));
        }

        let request = PaymentRequest {
            order_id: order_id.clone(),
            amount: input.amount.clone(),
            currency: input.currency.clone(),
            payment_method: input.payment_method.clone(),
        };

        // Nothing is stored until the provider has accepted the payment.
        let payment = gateway.create_payment(&request).await.map_err(|e| {
            warn!(order_id = %order_id, provider = gateway.name(), error = %e, "Payment creation failed");
            e
        })?;

        let mut tx = Transaction::new(
            input.merchant_id,
            order_id,
            gateway.name().to_string(),
            input.amount,
            input.currency,
            input.payment_method,
        );
        tx.external_ref = Some(payment.external_ref);
        tx.payment_url = payment.payment_url;

        // The unique index still catches a concurrent create with the same order id.
        let created = self.transactions.create(&tx).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => CreateTransactionError::DuplicateOrder(tx.order_id.clone()),
            other => other.into(),
        })?;

        info!(
            transaction_id = %created.id,
            order_id = %created.order_id,
            provider = %created.provider,
            "Transaction created"
        );

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryMerchantRepository, InMemoryTransactionRepository};
    use crate::domain::{Merchant, TransactionStatus};
    use crate::gateways::{MockGateway, XenditGateway};

    async fn setup() -> (CreateTransaction, Arc<InMemoryTransactionRepository>, Uuid) {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let merchants = Arc::new(InMemoryMerchantRepository::new());
        let merchant = Merchant::new("Toko".to_string(), None);
        let merchant_id = merchant.id;
        merchants.put(merchant).await;

        let use_case = CreateTransaction::new(
            Arc::new(GatewayRegistry::new().with(Arc::new(MockGateway::new()))),
            transactions.clone(),
            merchants,
        );
        (use_case, transactions, merchant_id)
    }

    fn input(merchant_id: Uuid, order_id: &str) -> CreateTransactionInput {
        CreateTransactionInput {
            merchant_id,
            order_id: order_id.to_string(),
            provider: "mock".to_string(),
            amount: BigDecimal::from(50000),
            currency: "IDR".to_string(),
            payment_method: Some("qris".to_string()),
        }
    }

    #[tokio::test]
    async fn test_creates_pending_transaction_with_payment_details() {
        let (use_case, transactions, merchant_id) = setup().await;

        let tx = use_case.execute(input(merchant_id, "ORD-100")).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.provider, "mock");
        assert!(tx.external_ref.as_deref().unwrap().starts_with("mock-"));
        assert!(tx.payment_url.is_some());

        let stored = transactions.find_by_order_id("ORD-100").await.unwrap().unwrap();
        assert_eq!(stored.id, tx.id);
    }

    #[tokio::test]
    async fn test_duplicate_order_id_rejected() {
        let (use_case, _, merchant_id) = setup().await;

        use_case.execute(input(merchant_id, "ORD-100")).await.unwrap();
        let err = use_case.execute(input(merchant_id, "ORD-100")).await.unwrap_err();
        assert!(matches!(err, CreateTransactionError::DuplicateOrder(id) if id == "ORD-100"));
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let (use_case, _, merchant_id) = setup().await;

        let mut request = input(merchant_id, "ORD-101");
        request.provider = "paypal".to_string();
        let err = use_case.execute(request).await.unwrap_err();
        assert!(matches!(err, CreateTransactionError::UnsupportedProvider(_)));
    }

    #[tokio::test]
    async fn test_unknown_merchant_rejected() {
        let (use_case, _, _) = setup().await;

        let err = use_case.execute(input(Uuid::new_v4(), "ORD-102")).await.unwrap_err();
        assert!(matches!(err, CreateTransactionError::MerchantNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (use_case, _, merchant_id) = setup().await;

        let mut request = input(merchant_id, "ORD-103");
        request.amount = BigDecimal::from(0);
        let err = use_case.execute(request).await.unwrap_err();
        assert!(matches!(err, CreateTransactionError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_gateway_failure_stores_nothing() {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let merchants = Arc::new(InMemoryMerchantRepository::new());
        let merchant = Merchant::new("Toko".to_string(), None);
        let merchant_id = merchant.id;
        merchants.put(merchant).await;

        // No API key: invoice creation fails before any request is sent.
        let xendit = XenditGateway::new(
            reqwest::Client::new(),
            "https://api.xendit.co".to_string(),
            None,
            "callback-token".to_string(),
        );
        let use_case = CreateTransaction::new(
            Arc::new(GatewayRegistry::new().with(Arc::new(xendit))),
            transactions.clone(),
            merchants,
        );

        let mut request = input(merchant_id, "ORD-X");
        request.provider = "xendit".to_string();
        let err = use_case.execute(request.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            CreateTransactionError::Gateway(GatewayError::NotConfigured(_))
        ));

        assert!(transactions.find_by_order_id("ORD-X").await.unwrap().is_none());
        assert_eq!(transactions.status_writes(), 0);

        // The order id stays free for a later attempt.
        let err = use_case.execute(request).await.unwrap_err();
        assert!(matches!(err, CreateTransactionError::Gateway(_)));
    }
}
