//! SCVM Fee - fee schedules, gas limits and amount parsing.
//!
//! - Legacy payload fees for forks before 2
//! - Gas-based fees from fork 2
//! - Gas budgets and receipt gas
//! - Amount strings with units
//!
//! Amounts are in aer (1 aergo = 10^18 aer).

pub mod amount;
pub mod error;
pub mod fee;

pub use amount::transform_amount;
pub use error::FeeError;
pub use fee::{
    calc_fee, disable_zero_fee, enable_zero_fee, gas_limit, is_zero_fee, max_gas_limit,
    max_payload_fee, payload_fee, payment_data_fee, payment_data_size, receipt_gas_used, tx_base_fee,
    tx_execute_fee, tx_fee, tx_gas, tx_max_fee, FREE_BYTE_SIZE, PAYLOAD_MAX_SIZE,
    STATE_DB_MAX_UPDATE_SIZE,
};
