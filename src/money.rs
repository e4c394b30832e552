// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Minor-unit money helpers.
//!
//! Every amount in the ledger is an `i64` count of minor units (cents,
//! centavos). Ratios such as tax, levy and interest rates are `Decimal`s and
//! are applied with half-up rounding back to a whole minor unit.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::{FinanceError, Result};

pub const MINOR_PER_MAJOR: i64 = 100;

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("static regex"));

/// Round a decimal to a whole minor unit, half away from zero.
pub fn round_minor(value: Decimal) -> Result<i64> {
    round_with(value, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_with(value: Decimal, strategy: RoundingStrategy) -> Result<i64> {
    value
        .round_dp_with_strategy(0, strategy)
        .to_i64()
        .ok_or_else(|| FinanceError::validation("amount", "out_of_range"))
}

/// `round(amount × pct / 100)`.
pub fn percent_of(amount: i64, pct: Decimal) -> Result<i64> {
    let value = Decimal::from(amount)
        .checked_mul(pct)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| FinanceError::validation("amount", "out_of_range"))?;
    round_minor(value)
}

/// `round(amount × factor)`.
pub fn scale(amount: i64, factor: Decimal) -> Result<i64> {
    let value = Decimal::from(amount)
        .checked_mul(factor)
        .ok_or_else(|| FinanceError::validation("amount", "out_of_range"))?;
    round_minor(value)
}

/// `round(amount / divisor)`; the divisor must be positive.
pub fn divide(amount: i64, divisor: Decimal) -> Result<i64> {
    if divisor <= Decimal::ZERO {
        return Err(FinanceError::validation("rate", "must_be_positive"));
    }
    let value = Decimal::from(amount)
        .checked_div(divisor)
        .ok_or_else(|| FinanceError::validation("amount", "out_of_range"))?;
    round_minor(value)
}

/// An amount as it arrives at the API boundary.
///
/// Callers say explicitly which unit they use; there is no guessing based on
/// magnitude or on the presence of a fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountInput {
    CurrencyMinor(i64),
    CurrencyMajor(Decimal),
}

impl AmountInput {
    pub fn to_minor(&self, field: &str) -> Result<i64> {
        match *self {
            AmountInput::CurrencyMinor(v) => {
                if v < 0 {
                    return Err(FinanceError::validation(field, "negative"));
                }
                Ok(v)
            }
            AmountInput::CurrencyMajor(d) => {
                if d.is_sign_negative() && !d.is_zero() {
                    return Err(FinanceError::validation(field, "negative"));
                }
                if d.normalize().scale() > 2 {
                    return Err(FinanceError::validation(field, "too_many_decimals"));
                }
                d.checked_mul(Decimal::from(MINOR_PER_MAJOR))
                    .and_then(|v| v.to_i64())
                    .ok_or_else(|| FinanceError::validation(field, "out_of_range"))
            }
        }
    }
}

/// Trim and upper-case a currency code, rejecting anything but three letters.
pub fn normalize_currency(code: &str) -> Result<String> {
    let c = code.trim().to_uppercase();
    if !CURRENCY_RE.is_match(&c) {
        return Err(FinanceError::validation("currency", "invalid_code"));
    }
    Ok(c)
}

/// Render minor units as a major-unit string, e.g. `-1234` -> `-12.34`.
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let per = MINOR_PER_MAJOR as u64;
    format!("{}{}.{:02}", sign, abs / per, abs % per)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_minor(d("2.5")).unwrap(), 3);
        assert_eq!(round_minor(d("2.4999")).unwrap(), 2);
        assert_eq!(round_minor(d("401.6")).unwrap(), 402);
    }

    #[test]
    fn percent_and_scale() {
        assert_eq!(percent_of(100_000, d("19")).unwrap(), 19_000);
        assert_eq!(percent_of(333, d("19")).unwrap(), 63);
        assert_eq!(scale(100_000, d("0.004")).unwrap(), 400);
        assert_eq!(scale(125, d("0.004")).unwrap(), 1);
    }

    #[test]
    fn divide_rejects_zero_divisor() {
        assert!(divide(100, Decimal::ZERO).is_err());
        assert_eq!(divide(400_000_000, d("4000")).unwrap(), 100_000);
        assert_eq!(divide(119_000, d("1.19")).unwrap(), 100_000);
    }

    #[test]
    fn amount_input_is_explicit() {
        assert_eq!(AmountInput::CurrencyMinor(1).to_minor("amount").unwrap(), 1);
        assert_eq!(
            AmountInput::CurrencyMajor(d("1")).to_minor("amount").unwrap(),
            100
        );
        assert_eq!(
            AmountInput::CurrencyMajor(d("10.50")).to_minor("amount").unwrap(),
            1_050
        );
        assert!(AmountInput::CurrencyMajor(d("1.005")).to_minor("amount").is_err());
        assert!(AmountInput::CurrencyMinor(-5).to_minor("amount").is_err());
    }

    #[test]
    fn amount_input_deserializes_tagged() {
        let v: AmountInput = serde_json::from_str(r#"{"currency_minor": 1200}"#).unwrap();
        assert_eq!(v, AmountInput::CurrencyMinor(1200));
        let v: AmountInput = serde_json::from_str(r#"{"currency_major": "12.00"}"#).unwrap();
        assert_eq!(v.to_minor("amount").unwrap(), 1200);
        assert!(serde_json::from_str::<AmountInput>("1200").is_err());
    }

    #[test]
    fn currency_codes() {
        assert_eq!(normalize_currency(" cop ").unwrap(), "COP");
        assert!(normalize_currency("CO").is_err());
        assert!(normalize_currency("C0P").is_err());
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_minor(100_400), "1004.00");
        assert_eq!(format_minor(-5), "-0.05");
    }
}
