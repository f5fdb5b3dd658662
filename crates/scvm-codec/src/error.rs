use thiserror::Error;

/// Errors raised while validating or decoding contract code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid code ({0} bytes is too short)")]
    TooShort(usize),

    #[error("invalid code (expected {expected} bytes, actual {actual} bytes)")]
    LengthMismatch { expected: u64, actual: usize },

    #[error("invalid code format")]
    InvalidFormat,

    #[error("invalid code version")]
    InvalidVersion,

    #[error("base58check error: {0}")]
    Base58(String),
}

impl From<bs58::decode::Error> for CodecError {
    fn from(e: bs58::decode::Error) -> Self {
        CodecError::Base58(e.to_string())
    }
}
