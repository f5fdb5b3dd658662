//! Fee schedules.
//!
//! Forks before 2 charge by payload and state update size; from fork 2 on
//! every fee is `gas * gas_price`.

use crate::error::FeeError;
use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};
use once_cell::sync::Lazy;
use scvm_types::units::{new_amount, GAER};
use scvm_types::ForkVersion;
use std::sync::atomic::{AtomicBool, Ordering};

/// Maximum payload size charged, also the per-tx state update cap.
pub const PAYLOAD_MAX_SIZE: i64 = 200 * 1024;
pub const STATE_DB_MAX_UPDATE_SIZE: i64 = PAYLOAD_MAX_SIZE;
/// Bytes of payload or state update that are never charged.
pub const FREE_BYTE_SIZE: i64 = 200;
/// Base gas of every transaction.
pub const TX_GAS_SIZE: u64 = 100_000;
/// Gas per charged payload byte.
pub const GAS_PER_BYTE: u64 = 5;

/// 0.002 aergo
pub static BASE_TX_FEE: Lazy<BigUint> = Lazy::new(|| new_amount(2_000_000, GAER));
/// 0.000005 aergo per byte
pub static AER_PER_BYTE: Lazy<BigUint> = Lazy::new(|| new_amount(5_000, GAER));
static STATE_DATA_MAX_FEE: Lazy<BigUint> =
    Lazy::new(|| &*AER_PER_BYTE * BigUint::from((STATE_DB_MAX_UPDATE_SIZE - FREE_BYTE_SIZE) as u64));

static ZERO_FEE: AtomicBool = AtomicBool::new(false);

/// Private-chain mode where every fee is zero.
pub fn is_zero_fee() -> bool {
    ZERO_FEE.load(Ordering::SeqCst)
}

pub fn enable_zero_fee() {
    ZERO_FEE.store(true, Ordering::SeqCst);
}

pub fn disable_zero_fee() {
    ZERO_FEE.store(false, Ordering::SeqCst);
}

/// Charged bytes of a payload or update of `size` bytes.
pub fn payment_data_size(size: i64) -> i64 {
    (size - FREE_BYTE_SIZE).max(0)
}

/// Legacy (fork < 2) fee of a payload.
pub fn payload_fee(payload_size: usize) -> BigUint {
    if is_zero_fee() {
        return BigUint::zero();
    }
    let charged = payment_data_size(payload_size as i64).min(PAYLOAD_MAX_SIZE);
    &*BASE_TX_FEE + &*AER_PER_BYTE * BigUint::from(charged as u64)
}

/// Legacy (fork < 2) upper bound of the fee of a transaction.
pub fn max_payload_fee(payload_size: usize) -> BigUint {
    if is_zero_fee() {
        return BigUint::zero();
    }
    if payload_size == 0 {
        return BASE_TX_FEE.clone();
    }
    payload_fee(payload_size) + &*STATE_DATA_MAX_FEE
}

/// Legacy (fork < 2) fee of the state updated by a contract.
pub fn payment_data_fee(db_update_size: i64) -> BigUint {
    if is_zero_fee() {
        return BigUint::zero();
    }
    &*AER_PER_BYTE * BigUint::from(payment_data_size(db_update_size) as u64)
}

/// Base gas of a transaction with a payload of `payload_size` bytes.
pub fn tx_gas(payload_size: usize) -> u64 {
    if is_zero_fee() {
        return 0;
    }
    let charged = payment_data_size(payload_size as i64).min(PAYLOAD_MAX_SIZE) as u64;
    TX_GAS_SIZE + GAS_PER_BYTE * charged
}

pub fn calc_fee(gas_price: &BigUint, gas: u64) -> BigUint {
    gas_price * BigUint::from(gas)
}

pub fn tx_base_fee(fork: ForkVersion, gas_price: &BigUint, payload_size: usize) -> BigUint {
    if is_zero_fee() {
        return BigUint::zero();
    }
    if fork < 2 {
        return payload_fee(payload_size);
    }
    calc_fee(gas_price, tx_gas(payload_size))
}

pub fn tx_execute_fee(fork: ForkVersion, gas_price: &BigUint, used_gas: u64, db_update_total: i64) -> BigUint {
    if is_zero_fee() {
        return BigUint::zero();
    }
    if fork < 2 {
        return payment_data_fee(db_update_total);
    }
    calc_fee(gas_price, used_gas)
}

/// Same as [`tx_base_fee`], argument order of the transaction pool.
pub fn tx_fee(fork: ForkVersion, payload_size: usize, gas_price: &BigUint) -> BigUint {
    tx_base_fee(fork, gas_price, payload_size)
}

/// Upper bound of the fee a transaction may be charged.
pub fn tx_max_fee(
    fork: ForkVersion,
    payload_size: usize,
    gas_limit: u64,
    balance: &BigInt,
    gas_price: &BigUint,
) -> Result<BigUint, FeeError> {
    if is_zero_fee() {
        return Ok(BigUint::zero());
    }
    if fork < 2 {
        return Ok(max_payload_fee(payload_size));
    }
    let min_gas = tx_gas(payload_size);
    let gas_limit = if gas_limit == 0 {
        max_gas_limit(balance, gas_price)
    } else {
        gas_limit
    };
    if gas_limit < min_gas {
        return Err(FeeError::MinimumRequiredGas(min_gas));
    }
    Ok(calc_fee(gas_price, gas_limit))
}

/// Gas purchasable with `balance`; saturates to `u64::MAX` for negative or
/// oversized quotients.
pub fn max_gas_limit(balance: &BigInt, gas_price: &BigUint) -> u64 {
    if gas_price.is_zero() {
        return u64::MAX;
    }
    let quotient = balance / BigInt::from(gas_price.clone());
    quotient.to_u64().unwrap_or(u64::MAX)
}

/// Gas available to contract execution once the base gas is paid.
#[allow(clippy::too_many_arguments)]
pub fn gas_limit(
    fork: ForkVersion,
    is_fee_delegation: bool,
    tx_gas_limit: u64,
    payload_size: usize,
    gas_price: &BigUint,
    used_fee: &BigUint,
    sender_balance: &BigUint,
    receiver_balance: &BigUint,
) -> Result<u64, FeeError> {
    if is_zero_fee() || fork < 2 {
        return Ok(0);
    }
    let from_balance = |balance: &BigUint| {
        let remaining = BigInt::from(balance.clone()) - BigInt::from(used_fee.clone());
        match max_gas_limit(&remaining, gas_price) {
            0 => Err(FeeError::NotEnoughBalance),
            limit => Ok(limit),
        }
    };
    if is_fee_delegation {
        return from_balance(receiver_balance);
    }
    if tx_gas_limit == 0 {
        return from_balance(sender_balance);
    }
    let min_gas = tx_gas(payload_size);
    if tx_gas_limit <= min_gas {
        return Err(FeeError::MinimumGasAmount(min_gas));
    }
    Ok(tx_gas_limit - min_gas)
}

/// Gas reported in the receipt for a charged fee.
pub fn receipt_gas_used(fork: ForkVersion, is_governance: bool, tx_fee: &BigUint, gas_price: &BigUint) -> u64 {
    if is_zero_fee() || fork < 2 || is_governance || gas_price.is_zero() {
        return 0;
    }
    (tx_fee / gas_price).to_u64().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{const_mutex, Mutex, MutexGuard};

    static FEE_LOCK: Mutex<()> = const_mutex(());

    /// Serialises tests that depend on the zero-fee switch.
    fn fee_guard() -> MutexGuard<'static, ()> {
        let guard = FEE_LOCK.lock();
        disable_zero_fee();
        guard
    }

    fn gaer(n: u64) -> BigUint {
        new_amount(n, GAER)
    }

    fn gaer_signed(n: i64) -> BigInt {
        BigInt::from(n) * BigInt::from(GAER)
    }

    #[test]
    fn test_tx_base_fee() {
        let _g = fee_guard();
        let cases = [
            (1, 1, 0, 2_000_000),
            (1, 5, 200, 2_000_000),
            (1, 5, 201, 2_005_000),
            (1, 5, 2_047_800, 1_026_000_000),
            (1, 5, 20_480_000, 1_026_000_000),
            (2, 1, 0, 100_000),
            (2, 1, 201, 100_005),
            (2, 1, 2_047_800, 1_124_000),
            (2, 5, 201, 500_025),
            (2, 5, 700, 512_500),
            (2, 5, 2_048_000, 5_620_000),
            (3, 5, 100, 500_000),
        ];
        for (fork, price, size, expected) in cases {
            assert_eq!(tx_base_fee(fork, &gaer(price), size), gaer(expected), "fork {} size {}", fork, size);
        }
    }

    #[test]
    fn test_first_bytes_free() {
        let _g = fee_guard();
        for fork in 0..5 {
            assert_eq!(tx_base_fee(fork, &gaer(3), 0), tx_base_fee(fork, &gaer(3), 200));
        }
    }

    #[test]
    fn test_tx_execute_fee() {
        let _g = fee_guard();
        assert_eq!(tx_execute_fee(1, &BigUint::zero(), 0, 200), gaer(0));
        assert_eq!(tx_execute_fee(1, &BigUint::zero(), 0, 201), gaer(5_000));
        assert_eq!(tx_execute_fee(1, &BigUint::zero(), 0, 10_200), gaer(50_000_000));
        assert_eq!(tx_execute_fee(2, &gaer(1), 200, 0), gaer(200));
        assert_eq!(tx_execute_fee(3, &gaer(5), 100_000, 0), gaer(500_000));
    }

    #[test]
    fn test_tx_max_fee() {
        let _g = fee_guard();
        let zero = BigInt::zero();
        assert_eq!(tx_max_fee(1, 0, 0, &zero, &BigUint::zero()).unwrap(), gaer(2_000_000));
        assert_eq!(tx_max_fee(1, 1, 0, &zero, &BigUint::zero()).unwrap(), gaer(1_025_000_000));
        assert_eq!(tx_max_fee(1, 201, 0, &zero, &BigUint::zero()).unwrap(), gaer(1_025_005_000));
        assert_eq!(tx_max_fee(1, 1200, 0, &zero, &BigUint::zero()).unwrap(), gaer(1_030_000_000));

        let err = tx_max_fee(2, 0, 1000, &zero, &gaer(5)).unwrap_err();
        assert_eq!(err.to_string(), "minimum required gas: 100000");
        assert_eq!(tx_max_fee(2, 0, 100_000, &zero, &gaer(5)).unwrap(), gaer(500_000));
        assert_eq!(tx_max_fee(2, 0, 0, &gaer_signed(500_000), &gaer(5)).unwrap(), gaer(500_000));
        assert_eq!(
            tx_max_fee(2, 0, 0, &gaer_signed(-1), &gaer(5)).unwrap(),
            BigUint::from(u64::MAX) * gaer(5)
        );
    }

    #[test]
    fn test_tx_gas() {
        let _g = fee_guard();
        for (size, gas) in [
            (0, 100_000),
            (200, 100_000),
            (201, 100_005),
            (1000, 104_000),
            (204_800, 1_123_000),
            (205_000, 1_124_000),
            (20_480_000, 1_124_000),
        ] {
            assert_eq!(tx_gas(size), gas, "size {}", size);
        }
    }

    #[test]
    fn test_max_gas_limit() {
        assert_eq!(max_gas_limit(&BigInt::from(100), &BigUint::from(5u32)), 20);
        assert_eq!(max_gas_limit(&BigInt::from(100), &BigUint::from(1u32)), 100);
        assert_eq!(max_gas_limit(&BigInt::from(0), &BigUint::from(5u32)), 0);
        assert_eq!(max_gas_limit(&BigInt::from(-100), &BigUint::from(5u32)), u64::MAX);
    }

    #[test]
    fn test_gas_limit() {
        let _g = fee_guard();
        let z = BigUint::zero();
        assert_eq!(gas_limit(1, false, 0, 0, &z, &z, &z, &z), Ok(0));

        // fee delegation draws from the receiver
        assert_eq!(gas_limit(2, true, 0, 0, &gaer(1), &gaer(10), &z, &gaer(5)), Ok(u64::MAX));
        assert_eq!(gas_limit(2, true, 0, 0, &gaer(1), &gaer(5), &z, &gaer(5)), Err(FeeError::NotEnoughBalance));
        assert_eq!(gas_limit(2, true, 0, 0, &gaer(1), &gaer(5), &z, &gaer(10)), Ok(5));

        // no limit in the tx: sender balance
        assert_eq!(gas_limit(2, false, 0, 0, &gaer(1), &gaer(10), &gaer(5), &z), Ok(u64::MAX));
        assert_eq!(gas_limit(2, false, 0, 0, &gaer(1), &gaer(5), &gaer(5), &z), Err(FeeError::NotEnoughBalance));
        assert_eq!(gas_limit(2, false, 0, 0, &gaer(1), &gaer(5), &gaer(10), &z), Ok(5));

        // explicit limit
        assert_eq!(gas_limit(2, false, 100_000, 100, &z, &z, &z, &z), Err(FeeError::MinimumGasAmount(100_000)));
        assert_eq!(gas_limit(2, false, 150_000, 100, &z, &z, &z, &z), Ok(50_000));
        assert_eq!(gas_limit(2, false, 200_000, 100, &z, &z, &z, &z), Ok(100_000));
    }

    #[test]
    fn test_receipt_gas_used() {
        let _g = fee_guard();
        let p = |n: u32| BigUint::from(n);
        assert_eq!(receipt_gas_used(1, false, &p(100), &p(5)), 0);
        assert_eq!(receipt_gas_used(2, true, &p(100), &p(5)), 0);
        assert_eq!(receipt_gas_used(2, false, &p(10), &p(1)), 10);
        assert_eq!(receipt_gas_used(2, false, &p(10), &p(5)), 2);
        assert_eq!(receipt_gas_used(2, false, &p(100), &p(5)), 20);
    }

    #[test]
    fn test_zero_fee_mode() {
        let _g = fee_guard();
        enable_zero_fee();
        assert!(is_zero_fee());
        assert!(tx_base_fee(2, &gaer(5), 1000).is_zero());
        assert!(max_payload_fee(10).is_zero());
        assert_eq!(gas_limit(3, false, 0, 0, &gaer(1), &gaer(1), &gaer(1), &gaer(1)), Ok(0));
        disable_zero_fee();
        assert!(!is_zero_fee());
    }
}
