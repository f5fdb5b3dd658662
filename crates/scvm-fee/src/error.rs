use thiserror::Error;

/// Errors from fee computation and amount parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("minimum required gas: {0}")]
    MinimumRequiredGas(u64),

    #[error("the minimum required amount of gas: {0}")]
    MinimumGasAmount(u64),

    #[error("not enough balance for fee")]
    NotEnoughBalance,

    #[error("negative amount not allowed")]
    NegativeAmount,

    #[error("converting error for {kind}: {input}")]
    Converting { kind: &'static str, input: String },
}
