use ethers::types::U256;

use crate::error::MarketError;

/// wei
pub const EVM_DECIMALS: u32 = 18;
/// yoctoNEAR
pub const NEAR_DECIMALS: u32 = 24;

/// Converts a human decimal such as `"2.5"` into the chain's smallest unit.
///
/// Rejects anything that would have to be truncated (more fraction digits
/// than `decimals`) along with signs, exponents and stray characters.
pub fn to_smallest_unit(display: &str, decimals: u32) -> Result<U256, MarketError> {
    let trimmed = display.trim();
    let invalid = || MarketError::InvalidAmount(display.to_string());

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (trimmed, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if frac_part.len() as u32 > decimals {
        return Err(invalid());
    }

    let digits = format!(
        "{}{:0<width$}",
        int_part,
        frac_part,
        width = decimals as usize
    );
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_dec_str(digits).map_err(|_| invalid())
}

/// Canonical decimal text of a smallest-unit amount: no trailing fraction
/// zeros, no dangling point.
pub fn to_display_unit(amount: U256, decimals: u32) -> Result<String, MarketError> {
    if decimals > 77 {
        return Err(MarketError::InvalidAmount(format!("{} decimals", decimals)));
    }
    let scale = U256::exp10(decimals as usize);
    let (integer, fraction) = amount.div_mod(scale);

    if fraction.is_zero() {
        return Ok(integer.to_string());
    }
    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    Ok(format!("{}.{}", integer, fraction.trim_end_matches('0')))
}

/// Moves an amount between chains' smallest units through its display value.
/// Fails with `InvalidAmount` when `to` cannot hold every digit of it.
pub fn rescale(amount: U256, from: u32, to: u32) -> Result<U256, MarketError> {
    if from == to {
        return Ok(amount);
    }
    to_smallest_unit(&to_display_unit(amount, from)?, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_decimal(display: &str) -> String {
        let trimmed = display.trim();
        let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let int_part = int_part.trim_start_matches('0');
        let frac_part = frac_part.trim_end_matches('0');
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        if frac_part.is_empty() {
            int_part.to_string()
        } else {
            format!("{}.{}", int_part, frac_part)
        }
    }

    #[test]
    fn rescale_moves_yocto_prices_to_wei() {
        let yocto = U256::from(25u64) * U256::exp10(23);
        assert_eq!(
            rescale(yocto, NEAR_DECIMALS, EVM_DECIMALS).unwrap(),
            U256::from(25u64) * U256::exp10(17)
        );
        assert_eq!(rescale(U256::from(7u64), EVM_DECIMALS, EVM_DECIMALS).unwrap(), U256::from(7u64));
        assert!(matches!(
            rescale(U256::one(), NEAR_DECIMALS, EVM_DECIMALS),
            Err(MarketError::InvalidAmount(_))
        ));
    }

    #[test]
    fn converts_to_smallest_unit_exactly() {
        assert_eq!(
            to_smallest_unit("2.5", NEAR_DECIMALS).unwrap(),
            U256::from(25u64) * U256::exp10(23)
        );
        assert_eq!(
            to_smallest_unit("0.1", EVM_DECIMALS).unwrap(),
            U256::exp10(17)
        );
        assert_eq!(to_smallest_unit("3", EVM_DECIMALS).unwrap(), U256::from(3u64) * U256::exp10(18));
        assert_eq!(to_smallest_unit(".5", EVM_DECIMALS).unwrap(), U256::from(5u64) * U256::exp10(17));
        assert_eq!(to_smallest_unit("0", NEAR_DECIMALS).unwrap(), U256::zero());
    }

    #[test]
    fn smallest_unit_of_finest_granularity_is_one() {
        assert_eq!(
            to_smallest_unit("0.000000000000000000000001", NEAR_DECIMALS).unwrap(),
            U256::one()
        );
        assert_eq!(
            to_smallest_unit("0.000000000000000001", EVM_DECIMALS).unwrap(),
            U256::one()
        );
    }

    #[test]
    fn rejects_inputs_that_would_lose_precision_or_are_malformed() {
        for bad in [
            "",
            ".",
            "-1",
            "+1",
            "1e18",
            "1.2.3",
            "abc",
            "0.0000000000000000001",
        ] {
            assert!(
                to_smallest_unit(bad, EVM_DECIMALS).is_err(),
                "`{}` should be rejected",
                bad
            );
        }
    }

    #[test]
    fn display_unit_is_canonical() {
        assert_eq!(
            to_display_unit(U256::from(25u64) * U256::exp10(23), NEAR_DECIMALS).unwrap(),
            "2.5"
        );
        assert_eq!(to_display_unit(U256::exp10(18), EVM_DECIMALS).unwrap(), "1");
        assert_eq!(to_display_unit(U256::zero(), NEAR_DECIMALS).unwrap(), "0");
        assert_eq!(
            to_display_unit(U256::one(), NEAR_DECIMALS).unwrap(),
            "0.000000000000000000000001"
        );
    }

    #[test]
    fn display_of_smallest_round_trips_for_canonical_inputs() {
        let samples = [
            "2.5",
            "0.1",
            "0.05",
            "1",
            "123456789.123456789",
            "0.000000000000000000000001",
            "99999999.999999999999999999999999",
        ];
        for sample in samples {
            let smallest = to_smallest_unit(sample, NEAR_DECIMALS).unwrap();
            assert_eq!(to_display_unit(smallest, NEAR_DECIMALS).unwrap(), sample);
        }

        let smallest = to_smallest_unit("1.250000", EVM_DECIMALS).unwrap();
        assert_eq!(
            to_display_unit(smallest, EVM_DECIMALS).unwrap(),
            canonical_decimal("1.250000")
        );
    }

    #[test]
    fn canonical_decimal_strips_redundant_zeros() {
        assert_eq!(canonical_decimal("001.2500"), "1.25");
        assert_eq!(canonical_decimal("0.0"), "0");
        assert_eq!(canonical_decimal("10"), "10");
    }
}
