//! Accounting units.
//!
//! 1 Aergo = 10^9 Gaer = 10^18 Aer.

use num_bigint::BigUint;

/// Multiplier of one aer.
pub const AER: u64 = 1;
/// Multiplier of one gaer in aer.
pub const GAER: u64 = 1_000_000_000;
/// Multiplier of one aergo in aer.
pub const AERGO: u64 = 1_000_000_000_000_000_000;

/// Builds `n * unit` as a big amount.
pub fn new_amount(n: u64, unit: u64) -> BigUint {
    BigUint::from(n) * BigUint::from(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(new_amount(1, AERGO), new_amount(1_000_000_000, GAER));
        assert_eq!(new_amount(3, GAER), BigUint::from(3_000_000_000u64));
        assert_eq!(new_amount(5, AER), BigUint::from(5u32));
    }
}
