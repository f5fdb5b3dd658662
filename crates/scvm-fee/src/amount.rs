//! Parsing of amount strings such as `"100aergo 200gaer"` or `"1.5 aergo"`.

use crate::error::FeeError;
use num_bigint::{BigInt, BigUint, Sign};
use once_cell::sync::Lazy;
use scvm_types::units::{AERGO, GAER};
use scvm_types::ForkVersion;

const AERGO_DECIMALS: usize = 18;

static UNITS: Lazy<[(&'static str, Option<BigInt>); 3]> = Lazy::new(|| {
    [
        ("aergo", Some(BigInt::from(AERGO))),
        ("gaer", Some(BigInt::from(GAER))),
        ("aer", None),
    ]
});

/// Converts an amount string to aer.
///
/// Units are matched case-insensitively in the order aergo, gaer, aer and
/// their quantities summed; trailing text without a unit counts as aer.
/// From fork 4 a decimal aergo amount (`"1.5 aergo"`) is accepted.
pub fn transform_amount(amount: &str, fork: ForkVersion) -> Result<BigUint, FeeError> {
    if amount.is_empty() {
        return Ok(BigUint::default());
    }

    if fork >= 4 && amount.contains('.') && amount.to_ascii_lowercase().ends_with("aergo") {
        let digits = amount[..amount.len() - "aergo".len()].trim_end_matches(' ');
        let converting = || FeeError::Converting {
            kind: "BigNum",
            input: amount.to_string(),
        };
        let scaled = parse_decimal_amount(digits, AERGO_DECIMALS).ok_or_else(converting)?;
        let value = parse_signed_integer(&scaled).ok_or_else(converting)?;
        return into_unsigned(value);
    }

    let mut total = BigInt::default();
    let mut remaining = amount;
    for (unit, multiplier) in UNITS.iter() {
        if let Some(idx) = remaining.to_ascii_lowercase().find(unit) {
            total += parse_and_convert(&remaining[..idx], unit, multiplier.as_ref(), amount)?;
            remaining = &remaining[idx + unit.len()..];
        }
    }
    if !remaining.is_empty() {
        total += parse_and_convert(remaining, "", None, amount)?;
    }
    into_unsigned(total)
}

fn into_unsigned(value: BigInt) -> Result<BigUint, FeeError> {
    value.to_biguint().ok_or(FeeError::NegativeAmount)
}

/// Shifts a decimal string by `decimals` digits, returning the integer
/// digits. `None` for a second point or excess fraction digits.
fn parse_decimal_amount(s: &str, decimals: usize) -> Option<String> {
    let Some((int_part, frac_part)) = s.split_once('.') else {
        return Some(s.to_string());
    };
    if frac_part.contains('.') || frac_part.len() > decimals {
        return None;
    }
    let joined = format!("{}{}{}", int_part, frac_part, "0".repeat(decimals - frac_part.len()));
    let trimmed = joined.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

/// Parses an optionally signed run of decimal digits.
fn parse_signed_integer(s: &str) -> Option<BigInt> {
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (Sign::Minus, &s[1..]),
        Some(b'+') => (Sign::Plus, &s[1..]),
        _ => (Sign::Plus, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = BigUint::parse_bytes(digits.as_bytes(), 10)?;
    Some(BigInt::from_biguint(sign, magnitude))
}

fn parse_and_convert(
    part: &str,
    unit: &str,
    multiplier: Option<&BigInt>,
    full: &str,
) -> Result<BigInt, FeeError> {
    let value = parse_signed_integer(part.trim()).ok_or_else(|| FeeError::Converting {
        kind: if unit.is_empty() { "Integer" } else { "BigNum" },
        input: full.trim().to_string(),
    })?;
    if value.sign() == Sign::Minus {
        return Err(FeeError::NegativeAmount);
    }
    Ok(match multiplier {
        Some(m) => value * m,
        None => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> BigUint {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(transform_amount("", 4).unwrap(), BigUint::default());
    }

    #[test]
    fn test_plain_integer() {
        assert_eq!(transform_amount("1000000000000000000", 3).unwrap(), amount("1000000000000000000"));
        assert_eq!(transform_amount(" 42 ", 3).unwrap(), amount("42"));
    }

    #[test]
    fn test_units() {
        assert_eq!(transform_amount("100aergo 200gaer", 3).unwrap(), amount("100000000200000000000"));
        assert_eq!(transform_amount("5 GAER", 3).unwrap(), amount("5000000000"));
        assert_eq!(transform_amount("7aer", 3).unwrap(), amount("7"));
        assert_eq!(transform_amount("1aergo 1gaer 1aer", 3).unwrap(), amount("1000000001000000001"));
        assert_eq!(transform_amount("1aergo 5", 3).unwrap(), amount("1000000000000000005"));
    }

    #[test]
    fn test_decimal_aergo() {
        assert_eq!(transform_amount("1.5 aergo", 4).unwrap(), amount("1500000000000000000"));
        assert_eq!(transform_amount("0.000000000000000001aergo", 4).unwrap(), amount("1"));
        assert_eq!(transform_amount("0.0 aergo", 4).unwrap(), amount("0"));
    }

    #[test]
    fn test_decimal_rejected_before_fork4() {
        let err = transform_amount("1.5 aergo", 3).unwrap_err();
        assert_eq!(err.to_string(), "converting error for BigNum: 1.5 aergo");
    }

    #[test]
    fn test_decimal_errors() {
        let err = transform_amount("1.5.1 aergo", 4).unwrap_err();
        assert_eq!(err.to_string(), "converting error for BigNum: 1.5.1 aergo");
        assert!(transform_amount("1.0000000000000000001 aergo", 4).is_err());
        assert_eq!(transform_amount("-1.5 aergo", 4), Err(FeeError::NegativeAmount));
    }

    #[test]
    fn test_negative() {
        let err = transform_amount("-1", 4).unwrap_err();
        assert_eq!(err.to_string(), "negative amount not allowed");
        assert_eq!(transform_amount("-1 gaer", 4), Err(FeeError::NegativeAmount));
    }

    #[test]
    fn test_converting_errors() {
        assert_eq!(
            transform_amount("abc", 4).unwrap_err().to_string(),
            "converting error for Integer: abc"
        );
        assert_eq!(
            transform_amount("xgaer", 4).unwrap_err().to_string(),
            "converting error for BigNum: xgaer"
        );
        assert!(transform_amount("1_000", 4).is_err());
    }
}
