//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.
//! Every USD value and health factor is an integer scaled by [`PRECISION`].

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT PRECISION
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol precision: 1.0 == 1e18
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Oracle feeds report prices with 8 decimals
pub const FEED_PRECISION: u128 = 100_000_000;

/// Bridges oracle decimals (1e8) to protocol precision (1e18)
pub const ADDITIONAL_FEED_PRECISION: u128 = 10_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// RISK PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Share of collateral value counted toward solvency - 50%
pub const LIQUIDATION_THRESHOLD: u128 = 50;

/// Denominator for threshold and bonus percentages
pub const LIQUIDATION_PRECISION: u128 = 100;

/// Liquidator bonus on top of the repaid debt value - 10%
pub const LIQUIDATION_BONUS: u128 = 10;

/// Positions below this health factor are liquidatable (1.0)
pub const MIN_HEALTH_FACTOR: u128 = PRECISION;

/// Health factor of a position with no debt
pub const MAX_HEALTH_FACTOR: u128 = u128::MAX;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum price staleness in seconds (3 hours)
pub const MAX_PRICE_STALENESS_SECS: u64 = 3 * 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// BOOKKEEPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of events kept in the in-memory log
pub const MAX_EVENT_LOG: usize = 1000;

/// Length of an account address in bytes
pub const ADDRESS_LENGTH: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_precision_bridges_to_protocol() {
        assert_eq!(FEED_PRECISION * ADDITIONAL_FEED_PRECISION, PRECISION);
    }

    #[test]
    fn test_risk_constants() {
        assert!(LIQUIDATION_THRESHOLD <= LIQUIDATION_PRECISION);
        assert!(LIQUIDATION_BONUS < LIQUIDATION_PRECISION);
        assert_eq!(MIN_HEALTH_FACTOR, PRECISION);
    }
}
