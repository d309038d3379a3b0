//! Major/minor unit conversion with exact decimal arithmetic.
//!
//! Amounts cross the chain-client boundary in the chain's native minor unit
//! (wei, satoshi) and cross the provider façade in decimal major units
//! (ether, coin). Conversion is exact on [`Decimal`] — never floating
//! point — and rounding happens exactly once, at the minor-unit boundary,
//! with a single rule: round half away from zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AmountError;

/// Maximum supported decimal precision for a currency (wei-scale).
pub const MAX_DECIMALS: u32 = 18;

fn pow10(decimals: u32) -> Decimal {
    // 10^18 fits comfortably in u64.
    Decimal::from(10u64.pow(decimals))
}

/// Convert a major-unit amount to the chain's integer minor unit.
///
/// Rounds half away from zero at the minor-unit boundary. Negative amounts
/// are rejected: nothing in the pipeline ever owes a negative transfer.
pub fn to_minor_units(amount: Decimal, decimals: u32) -> Result<u128, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedPrecision(decimals));
    }
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::NegativeAmount(amount));
    }
    let scaled = amount
        .checked_mul(pow10(decimals))
        .ok_or_else(|| AmountError::OutOfRange(amount.to_string()))?;
    let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded
        .to_u128()
        .ok_or_else(|| AmountError::OutOfRange(amount.to_string()))
}

/// Convert an integer minor-unit value to a major-unit decimal amount.
pub fn from_minor_units(minor: u128, decimals: u32) -> Result<Decimal, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedPrecision(decimals));
    }
    let value =
        i128::try_from(minor).map_err(|_| AmountError::OutOfRange(minor.to_string()))?;
    Decimal::try_from_i128_with_scale(value, decimals)
        .map_err(|_| AmountError::OutOfRange(minor.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn ether_to_wei() {
        let one = Decimal::from_str("1").unwrap();
        assert_eq!(to_minor_units(one, 18).unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn coin_to_satoshi() {
        let amount = Decimal::from_str("0.00000001").unwrap();
        assert_eq!(to_minor_units(amount, 8).unwrap(), 1);
    }

    #[test]
    fn wei_to_ether() {
        let wei = 1_500_000_000_000_000_000u128;
        let expected = Decimal::from_str("1.5").unwrap();
        assert_eq!(from_minor_units(wei, 18).unwrap(), expected);
    }

    #[test]
    fn round_half_away_from_zero() {
        // 0.000000015 coin = 1.5 satoshi, rounds away from zero to 2.
        let amount = Decimal::from_str("0.000000015").unwrap();
        assert_eq!(to_minor_units(amount, 8).unwrap(), 2);
        // 1.4 satoshi rounds down.
        let amount = Decimal::from_str("0.000000014").unwrap();
        assert_eq!(to_minor_units(amount, 8).unwrap(), 1);
    }

    #[test]
    fn negative_amount_rejected() {
        let amount = Decimal::from_str("-1").unwrap();
        assert!(matches!(
            to_minor_units(amount, 8),
            Err(AmountError::NegativeAmount(_))
        ));
    }

    #[test]
    fn excessive_precision_rejected() {
        assert!(matches!(
            to_minor_units(Decimal::ONE, 19),
            Err(AmountError::UnsupportedPrecision(19))
        ));
        assert!(matches!(
            from_minor_units(1, 19),
            Err(AmountError::UnsupportedPrecision(19))
        ));
    }

    #[test]
    fn zero_round_trips() {
        assert_eq!(to_minor_units(Decimal::ZERO, 18).unwrap(), 0);
        assert_eq!(from_minor_units(0, 18).unwrap(), Decimal::ZERO);
    }

    proptest! {
        // Any satoshi value survives the minor -> major -> minor trip exactly.
        #[test]
        fn satoshi_round_trip(sats in 0u64..=21_000_000_0000_0000u64) {
            let major = from_minor_units(sats as u128, 8).unwrap();
            prop_assert_eq!(to_minor_units(major, 8).unwrap(), sats as u128);
        }

        // Wei values up to the total ether supply round-trip exactly.
        #[test]
        fn wei_round_trip(wei in 0u128..=120_000_000_000_000_000_000_000_000u128) {
            let major = from_minor_units(wei, 18).unwrap();
            prop_assert_eq!(to_minor_units(major, 18).unwrap(), wei);
        }

        // Major-unit amounts quoted at the currency's precision reproduce
        // themselves after converting down and back up.
        #[test]
        fn major_round_trip(units in 0i64..1_000_000_000i64, frac in 0u32..100_000_000u32) {
            let amount = Decimal::from(units) + Decimal::new(frac as i64, 8);
            let minor = to_minor_units(amount, 8).unwrap();
            prop_assert_eq!(from_minor_units(minor, 8).unwrap(), amount);
        }
    }
}
