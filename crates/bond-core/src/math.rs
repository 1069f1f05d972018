//! Fixed-point helpers shared by the ledger, schedule and rewards.
//!
//! All arithmetic is integer-only with u128 intermediates.

use crate::constants::{BPS_PRECISION, RATIO_PRECISION};

/// Fixed-point exponentiation: computes `(base/precision)^exp` in fixed-point.
///
/// Uses binary exponentiation for O(log n) multiplications.
/// `base` and return value are in fixed-point with `precision` as denominator.
/// Returns `None` on overflow, which cannot happen while `base <= precision`
/// and `precision <= 2^64`.
pub fn fixed_pow(base: u128, exp: u64, precision: u128) -> Option<u128> {
    if exp == 0 {
        return Some(precision); // (base/precision)^0 = 1.0
    }

    let mut result: u128 = precision;
    let mut b: u128 = base;
    let mut e = exp;

    while e > 0 {
        if e & 1 == 1 {
            result = result.checked_mul(b)? / precision;
        }
        e >>= 1;
        if e > 0 {
            b = b.checked_mul(b)? / precision;
        }
        if result == 0 {
            break;
        }
    }

    Some(result)
}

/// `a * b / denominator`, floored. `None` on overflow or a zero denominator.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    a.checked_mul(b).map(|p| p / denominator)
}

/// `numerator / denominator`, rounded up. `None` for a zero denominator.
pub fn ceil_div(numerator: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    Some(numerator.div_ceil(denominator))
}

/// Convert basis points into a [`RATIO_PRECISION`] fixed-point ratio.
pub fn bps_to_ratio(bps: u64) -> u128 {
    bps as u128 * RATIO_PRECISION / BPS_PRECISION as u128
}
