pub mod create_transaction;

pub use create_transaction::{CreateTransaction, CreateTransactionError, CreateTransactionInput};
