//! Store adapters implementing the repository ports.

pub mod in_memory;
pub mod postgres_merchant_repository;
pub mod postgres_transaction_repository;

pub use in_memory::{InMemoryMerchantRepository, InMemoryTransactionRepository};
pub use postgres_merchant_repository::PostgresMerchantRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
