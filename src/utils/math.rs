//! Fixed-point arithmetic and mathematical utilities.
//!
//! All state-transition math flows through these helpers: checked `u64`
//! amount arithmetic, checked `u128` accumulator arithmetic at PRECISION,
//! ratio constructors used by the engine and the ordered index, and the
//! fixed-point power function behind redemption-fee decay. Nothing here
//! wraps silently; every overflow and division by zero surfaces as an error.

use crate::error::{Error, Result};
use crate::utils::constants::{COLL_BASE_UNIT, PRECISION};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS (u64 amounts)
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u64, b: u64) -> Result<u64> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: u64, b: u64) -> Result<u64> {
    if b == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("{} / 0", a),
        });
    }
    Ok(a / b)
}

/// Safe multiplication then division (for better precision)
/// Computes (a * b) / c with u128 intermediate to prevent overflow
pub fn safe_mul_div(a: u64, b: u64, c: u64) -> Result<u64> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    let result = (a as u128) * (b as u128) / (c as u128);
    if result > u64::MAX as u128 {
        return Err(Error::Overflow {
            operation: format!("({} * {}) / {}", a, b, c),
        });
    }
    Ok(result as u64)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS (u128 accumulators)
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe u128 addition with overflow check
pub fn safe_add_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe u128 subtraction with underflow check
pub fn safe_sub_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Computes (a * b) / c over u128, floored.
///
/// When the direct product overflows, the larger operand is split into
/// quotient and remainder by `c` and the result reassembled exactly:
/// `(big / c) * small + (big % c) * small / c`. The split is exact whenever
/// the smaller operand times `c` fits in u128; past that the operation fails
/// closed with an overflow error.
pub fn safe_mul_div_u128(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    let (big, small) = if a >= b { (a, b) } else { (b, a) };
    let overflow = || Error::Overflow {
        operation: format!("({} * {}) / {}", a, b, c),
    };
    let hi = (big / c).checked_mul(small).ok_or_else(overflow)?;
    let lo = (big % c).checked_mul(small).ok_or_else(overflow)? / c;
    hi.checked_add(lo).ok_or_else(overflow)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Calculate the nominal collateralization ratio at PRECISION
///
/// Price-independent `collateral / debt`, used as the sort key of the
/// ordered index. A zero-debt position is infinitely collateralized.
pub fn calculate_nominal_ratio(collateral: u64, debt: u64) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    (collateral as u128) * PRECISION / (debt as u128)
}

/// Calculate collateral value in debt base units
///
/// # Arguments
/// * `collateral` - Collateral amount in base units
/// * `price` - Price in debt base units per whole collateral token
pub fn calculate_collateral_value(collateral: u64, price: u64) -> Result<u64> {
    safe_mul_div(collateral, price, COLL_BASE_UNIT)
}

/// Calculate the collateralization ratio at PRECISION
///
/// # Arguments
/// * `collateral` - Collateral amount in base units
/// * `debt` - Debt amount in debt base units
/// * `price` - Price in debt base units per whole collateral token
///
/// # Returns
/// `collateral value / debt` scaled by PRECISION (1.0 = PRECISION).
/// A zero-debt position is infinitely collateralized.
pub fn calculate_collateral_ratio(collateral: u64, debt: u64, price: u64) -> Result<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    let value = calculate_collateral_value(collateral, price)?;
    Ok((value as u128) * PRECISION / (debt as u128))
}

/// Calculate the collateral base units equivalent to a debt amount at the
/// given price, floored.
pub fn calculate_collateral_for_debt(debt_amount: u64, price: u64) -> Result<u64> {
    safe_mul_div(debt_amount, COLL_BASE_UNIT, price)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT POWER
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point multiply at PRECISION, rounded to nearest
fn dec_mul(a: u128, b: u128) -> u128 {
    (a * b + PRECISION / 2) / PRECISION
}

/// `base ^ exponent` at PRECISION by exponentiation-by-squaring
///
/// `base` must be a sub-unit factor (at most PRECISION); the exponent is
/// capped at the number of minutes in 1000 years, past which the result is
/// indistinguishable from zero for any decay factor.
pub fn dec_pow(base: u128, exponent: u64) -> u128 {
    const EXPONENT_CAP: u64 = 525_600_000;

    let mut n = exponent.min(EXPONENT_CAP);
    if n == 0 {
        return PRECISION;
    }
    let mut x = base.min(PRECISION);
    let mut y = PRECISION;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x);
            n /= 2;
        } else {
            y = dec_mul(x, y);
            x = dec_mul(x, x);
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

// ═══════════════════════════════════════════════════════════════════════════════
// UTILITY FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Calculate median of a slice of ratios (modifies the slice by sorting)
pub fn median(values: &mut [u128]) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2)
    } else {
        Some(values[mid])
    }
}
