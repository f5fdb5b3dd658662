use thiserror::Error;

/// Errors that can occur in type operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("invalid address version: {0:#04x}")]
    InvalidAddressVersion(u8),

    #[error("invalid address length: expected 33, got {0}")]
    InvalidAddressLength(usize),

    #[error("invalid call info: {0}")]
    InvalidCallInfo(String),

    #[error("invalid abi: {0}")]
    InvalidAbi(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

impl From<bs58::decode::Error> for TypesError {
    fn from(e: bs58::decode::Error) -> Self {
        TypesError::InvalidAddressFormat(e.to_string())
    }
}

impl From<serde_json::Error> for TypesError {
    fn from(e: serde_json::Error) -> Self {
        TypesError::Serialization(e.to_string())
    }
}
