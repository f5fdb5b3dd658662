use thiserror::Error;

/// Errors raised by the state layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("insufficient balance: {balance} amount to transfer: {amount}")]
    InsufficientBalance { balance: String, amount: String },

    #[error("invalid snapshot revision: {revision} (journal length {len})")]
    InvalidRevision { revision: usize, len: usize },

    #[error("account not found: {0}")]
    AccountNotFound(String),
}
