//! Fixed-point arithmetic and mathematical utilities.
//!
//! Safe arithmetic with overflow protection for 1e18-scaled integers. Products
//! of two 1e18 values overflow `u128`, so multiply-then-divide goes through a
//! 256-bit intermediate.

use primitive_types::U256;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::utils::constants::{MAX_HEALTH_FACTOR, PRECISION};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Overflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Computes `(a * b) / c` with a 256-bit intermediate, truncating toward zero
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    if result > U256::from(u128::MAX) {
        return Err(Error::Overflow {
            operation: format!("({} * {}) / {}", a, b, c),
        });
    }
    Ok(result.as_u128())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Render a 1e18-scaled value as a decimal (e.g. 2.5e18 -> 2.5)
///
/// Returns `None` for the no-debt health factor sentinel and for values too
/// large for a `Decimal`.
pub fn to_decimal(value: u128) -> Option<Decimal> {
    if value == MAX_HEALTH_FACTOR {
        return None;
    }
    let whole = Decimal::from_i128_with_scale(i128::try_from(value / PRECISION).ok()?, 0);
    let frac = Decimal::from_i128_with_scale((value % PRECISION) as i128, 18);
    whole.checked_add(frac).map(|d| d.normalize())
}
