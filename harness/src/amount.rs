//! # Amount Codec
//!
//! Conversion between human-readable token amounts ("coins", e.g. `"1.5"`)
//! and the integer base units a contract actually stores (e.g.
//! `"1500000000000000000"` for an 18-decimal token).
//!
//! Everything here is string surgery. There is no floating point anywhere in
//! this file and there must never be: a single `f64` round trip is enough to
//! turn `0.1` into `0.1000000000000000055511151231257827`. Integer parsing
//! only happens at the edges, into 256-bit values, where the ABI encoder or
//! the random draw needs a number.
//!
//! ## Canonical forms
//!
//! - Units: no leading zeros, `"0"` for zero.
//! - Coins: no leading zeros in the integer part (except a lone `"0"`), no
//!   trailing zeros in the fraction, no dot when the fraction is empty.
//!
//! Both round trips are exact on canonical inputs.

use alloy_primitives::U256;
use rand::Rng;
use thiserror::Error;

/// Errors raised by the codec.
///
/// The driver generates every amount it converts, so hitting one of these at
/// runtime is a bug in the harness itself, never a remote fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The string does not match the amount pattern for the requested width,
    /// or does not fit in 256 bits where a number was required.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
}

fn invalid(amount: &str) -> AmountError {
    AmountError::InvalidAmount(amount.to_string())
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn strip_leading_zeros(s: &str) -> &str {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

/// Returns `true` if `amount` is a well-formed amount for a token with
/// `decimals` fractional digits.
///
/// Accepted: `\d+` optionally followed by `.` and 1 to `decimals` digits.
/// A width of zero accepts integers only. Signs, exponents, whitespace and a
/// trailing dot are all rejected.
pub fn valid(amount: &str, decimals: u8) -> bool {
    match amount.split_once('.') {
        None => all_digits(amount),
        Some((int, frac)) => {
            decimals > 0
                && all_digits(int)
                && all_digits(frac)
                && frac.len() <= decimals as usize
        }
    }
}

/// Converts a coin amount into base units.
///
/// The fraction is right-padded to exactly `decimals` digits and glued to the
/// integer part; the result is returned in canonical form.
pub fn to_units(amount: &str, decimals: u8) -> Result<String, AmountError> {
    if !valid(amount, decimals) {
        return Err(invalid(amount));
    }
    let (int, frac) = amount.split_once('.').unwrap_or((amount, ""));
    let width = decimals as usize;

    let mut digits = String::with_capacity(int.len() + width);
    digits.push_str(int);
    digits.push_str(frac);
    digits.extend(std::iter::repeat('0').take(width - frac.len()));

    Ok(strip_leading_zeros(&digits).to_string())
}

/// Converts base units into a coin amount.
///
/// With `decimals == 0` the input is returned as is. Otherwise the digits are
/// left-padded until there is at least one integer digit, the dot goes
/// `decimals` places from the end, and the result is canonicalised.
pub fn to_coins(units: &str, decimals: u8) -> Result<String, AmountError> {
    if !valid(units, 0) {
        return Err(invalid(units));
    }
    if decimals == 0 {
        return Ok(units.to_string());
    }
    let width = decimals as usize;
    let padded = format!("{:0>w$}", units, w = width + 1);
    let (int, frac) = padded.split_at(padded.len() - width);

    let int = strip_leading_zeros(int);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        Ok(int.to_string())
    } else {
        Ok(format!("{int}.{frac}"))
    }
}

/// Parses a base-unit string into a 256-bit integer.
pub fn parse_units(units: &str) -> Result<U256, AmountError> {
    if !valid(units, 0) {
        return Err(invalid(units));
    }
    U256::from_str_radix(units, 10).map_err(|_| invalid(units))
}

/// Converts a coin amount straight to the 256-bit value the ABI wants.
pub fn to_units_u256(amount: &str, decimals: u8) -> Result<U256, AmountError> {
    parse_units(&to_units(amount, decimals)?)
}

/// Converts a 256-bit on-chain value into a coin amount.
pub fn u256_to_coins(value: U256, decimals: u8) -> String {
    // Display of a U256 is always a plain digit string.
    let digits = value.to_string();
    to_coins(&digits, decimals).unwrap_or(digits)
}

/// Returns `true` if a valid amount denotes zero.
pub fn is_zero(amount: &str) -> bool {
    amount.bytes().all(|b| b == b'0' || b == b'.')
}

/// Draws an integer uniformly from `[0, bound]`.
///
/// Masks a full 256-bit draw down to the bit length of `bound` and rejects
/// anything above it. At least half of all candidates are accepted.
pub fn uniform_inclusive<R: Rng + ?Sized>(rng: &mut R, bound: U256) -> U256 {
    let bits = bound.bit_len();
    if bits == 0 {
        return U256::ZERO;
    }
    let mask = U256::MAX >> (256 - bits);
    loop {
        let candidate = U256::from_limbs(rng.gen::<[u64; 4]>()) & mask;
        if candidate <= bound {
            return candidate;
        }
    }
}

/// Picks a random amount between zero and `balance`, inclusive.
///
/// The draw is uniform over base units, not over decimal strings, so every
/// representable amount is equally likely and nothing finer than one base
/// unit is ever produced.
pub fn random_amount<R: Rng + ?Sized>(
    rng: &mut R,
    balance: &str,
    decimals: u8,
) -> Result<String, AmountError> {
    let bound = to_units_u256(balance, decimals)?;
    let drawn = uniform_inclusive(rng, bound);
    to_coins(&drawn.to_string(), decimals)
}
