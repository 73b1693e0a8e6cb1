//! Input validation utilities for overlend.
//!
//! This module provides validation functions to ensure inputs meet
//! protocol requirements before processing.

use crate::error::{Error, Result};
use crate::utils::address::Address;

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate that an address is not the zero address
pub fn validate_address(address: &Address, role: &'static str) -> Result<()> {
    if address.is_zero() {
        return Err(Error::ZeroAddress(role));
    }
    Ok(())
}

/// Validate a percentage-style parameter against its denominator
pub fn validate_percentage(value: u128, denominator: u128, name: &str) -> Result<()> {
    if denominator == 0 {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: "denominator is zero".into(),
        });
    }
    if value > denominator {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} exceeds {}", value, denominator),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_zero() {
        assert_eq!(validate_non_zero(0), Err(Error::ZeroAmount));
        assert!(validate_non_zero(1).is_ok());
    }

    #[test]
    fn test_validate_address() {
        assert_eq!(
            validate_address(&Address::ZERO, "user"),
            Err(Error::ZeroAddress("user"))
        );
        assert!(validate_address(&Address::from_label("x"), "user").is_ok());
    }

    #[test]
    fn test_validate_percentage() {
        assert!(validate_percentage(50, 100, "threshold").is_ok());
        assert!(validate_percentage(101, 100, "threshold").is_err());
        assert!(validate_percentage(1, 0, "threshold").is_err());
    }
}
