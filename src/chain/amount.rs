//! Conversion between display amounts ("1.5") and minimal-unit integer
//! strings ("1500000").
//!
//! Everything is done on decimal digit strings so no float rounding can
//! creep in. Digits beyond the representable precision are truncated, never
//! rounded up.

use super::error::{ClientError, ClientResult};

/// `floor(display * 10^decimals)` as an integer string.
///
/// Accepts plain non-negative decimals ("12", "0.5", ".5", "3."). Signs,
/// exponents and other characters are rejected with `InvalidAmount`.
pub fn to_minimal_units(display: &str, decimals: u32) -> ClientResult<String> {
    let display = display.trim();
    let (int_part, frac_part) = match display.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (display, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ClientError::InvalidAmount(format!("'{}' is not a number", display)));
    }
    if !is_digits(int_part) || !is_digits(frac_part) {
        return Err(ClientError::InvalidAmount(format!("'{}' is not a number", display)));
    }

    let decimals = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(decimals - frac_part.len()));
    }

    Ok(strip_leading_zeros(&digits))
}

/// `minimal / 10^decimals` rendered with at most `precision` fractional
/// digits, trailing zeros and a dangling decimal point removed.
///
/// Empty input renders as "0".
pub fn to_display_units(minimal: &str, decimals: u32, precision: u32) -> ClientResult<String> {
    let minimal = minimal.trim();
    if minimal.is_empty() {
        return Ok("0".to_string());
    }
    if !is_digits(minimal) {
        return Err(ClientError::InvalidAmount(format!(
            "'{}' is not an integer amount",
            minimal
        )));
    }

    let digits = strip_leading_zeros(minimal);
    let decimals = decimals as usize;
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };

    let split = padded.len() - decimals;
    let (int_part, frac_part) = padded.split_at(split);
    let frac_part = &frac_part[..frac_part.len().min(precision as usize)];
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        Ok(int_part.to_string())
    } else {
        Ok(format!("{}.{}", int_part, frac_part))
    }
}

/// Validate a user-entered transfer amount and convert it.
///
/// Unlike the bare codec this rejects amounts that are zero once floored to
/// minimal units.
pub fn parse_transfer_amount(display: &str, decimals: u32) -> ClientResult<String> {
    let minimal = to_minimal_units(display, decimals)?;
    if minimal == "0" {
        return Err(ClientError::InvalidAmount(format!(
            "'{}' must be greater than zero",
            display.trim()
        )));
    }
    Ok(minimal)
}

/// Check that a minimal-unit amount is a positive integer string and return
/// it without leading zeros.
pub fn ensure_positive_minimal(amount: &str) -> ClientResult<String> {
    if amount.is_empty() || !is_digits(amount) {
        return Err(ClientError::InvalidAmount(format!(
            "'{}' is not an integer amount",
            amount
        )));
    }
    let canonical = strip_leading_zeros(amount);
    if canonical == "0" {
        return Err(ClientError::InvalidAmount("amount must be greater than zero".to_string()));
    }
    Ok(canonical)
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn strip_leading_zeros(digits: &str) -> String {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}
