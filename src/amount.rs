use ethers::types::U256;
use thiserror::Error;

/// Token quantity in the token's smallest indivisible unit.
pub type AmountRaw = U256;

/// Largest precision whose scale factor still fits in 256 bits.
const MAX_PRECISION: u8 = 77;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("enter an amount")]
    Empty,
    #[error("amount cannot be negative")]
    Negative,
    #[error("`{0}` is not a decimal number")]
    Malformed(String),
    #[error("amount has more than {precision} decimal places")]
    TooPrecise { precision: u8 },
    #[error("amount is too large")]
    Overflow,
}

/// Converts a human-entered decimal string into raw units.
///
/// The conversion is exact: fractional digits beyond `precision` are only
/// accepted when they are zeros.
pub fn parse_units(text: &str, precision: u8) -> Result<AmountRaw, AmountError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative);
    }
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
    {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }

    let significant = fraction.trim_end_matches('0');
    if significant.len() > usize::from(precision) {
        return Err(AmountError::TooPrecise { precision });
    }

    let scale = scale_factor(precision).ok_or(AmountError::Overflow)?;
    let whole_value = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| AmountError::Overflow)?
    };
    let fraction_value = if significant.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{significant:0<width$}", width = usize::from(precision));
        U256::from_dec_str(&padded).map_err(|_| AmountError::Overflow)?
    };

    whole_value
        .checked_mul(scale)
        .and_then(|value| value.checked_add(fraction_value))
        .ok_or(AmountError::Overflow)
}

/// Renders raw units as a decimal string without trailing zeros.
pub fn format_units(amount: AmountRaw, precision: u8) -> String {
    let digits = amount.to_string();
    let places = usize::from(precision);
    if places == 0 {
        return digits;
    }
    let padded = if digits.len() <= places {
        format!("{digits:0>width$}", width = places + 1)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - places);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

fn scale_factor(precision: u8) -> Option<U256> {
    if precision > MAX_PRECISION {
        return None;
    }
    U256::from(10u8).checked_pow(U256::from(precision))
}
