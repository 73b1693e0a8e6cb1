//! Error types for the overlend protocol.
//!
//! Every failure aborts the whole call. Variants are grouped by the class of
//! condition that caused them and carry enough data to diagnose the failure
//! without re-deriving state.

use thiserror::Error;

use crate::core::token::TokenId;
use crate::utils::address::Address;

/// Result type alias for overlend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input: zero amount, zero address, disallowed token
    Validation,
    /// Caller is not allowed to perform the action
    Authorization,
    /// Ledger or liquidity state does not permit the action
    State,
    /// Solvency rule violated
    Risk,
    /// Collaborator failure: token transfer or oracle
    External,
    /// Arithmetic, locking, serialization
    Internal,
}

/// Main error type for the overlend protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Address is the zero address
    #[error("Zero address supplied for {0}")]
    ZeroAddress(&'static str),

    /// Token has no oracle feed binding
    #[error("Token {0} is not allowed")]
    TokenNotAllowed(TokenId),

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Liquidator and target are the same account
    #[error("Cannot liquidate own position {0}")]
    CantLiquidateSelf(Address),

    /// Bonus waterfall fell short; only the protocol may take this liquidation
    #[error("Only the protocol can liquidate: bonus available {available} < needed {needed}")]
    OnlyProtocolCanLiquidateInsufficientBonus {
        /// Bonus the position can fund, USD (1e18)
        available: u128,
        /// Bonus owed to the liquidator, USD (1e18)
        needed: u128,
    },

    /// Not authorized to perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // State Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Ledger decrease would go below zero
    #[error("Insufficient {token} balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Account whose balance was decreased
        account: Address,
        /// Token of the balance
        token: TokenId,
        /// Requested decrease
        requested: u128,
        /// Current balance
        available: u128,
    },

    /// Protocol does not hold enough unborrowed tokens
    #[error("Insufficient {token} liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        /// Token being borrowed
        token: TokenId,
        /// Requested amount
        requested: u128,
        /// Available liquidity
        available: u128,
    },

    /// Repayment larger than outstanding debt
    #[error("Overpaid {token} debt: repay {requested}, owed {owed}")]
    OverpaidDebt {
        /// Token being repaid
        token: TokenId,
        /// Repayment amount
        requested: u128,
        /// Outstanding debt
        owed: u128,
    },

    /// Liquidation tries to cover more than the target owes
    #[error("Debt to cover {requested} exceeds borrowed {borrowed}")]
    DebtExceedsBorrowed {
        /// Requested coverage
        requested: u128,
        /// Outstanding debt of the target
        borrowed: u128,
    },

    /// Liquidator does not hold the debt tokens it wants to pay with
    #[error("Insufficient balance to liquidate: required {required}, available {available}")]
    InsufficientBalanceToLiquidate {
        /// Debt amount to pay
        required: u128,
        /// Caller's token balance
        available: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Risk Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position would end below the minimum health factor
    #[error("Health factor broken: {0}")]
    HealthFactorBroken(u128),

    /// Position is healthy and cannot be liquidated
    #[error("Health factor {0} is healthy, position cannot be liquidated")]
    HealthFactorHealthy(u128),

    /// Liquidation did not strictly improve the target's health factor
    #[error("Health factor not improved: starting {starting}, ending {ending}")]
    HealthFactorNotImproved {
        /// Health factor before settlement
        starting: u128,
        /// Health factor after settlement
        ending: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // External Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Token collaborator reported a failed transfer
    #[error("Transfer of {amount} {token} from {from} to {to} failed")]
    TransferFailed {
        /// Token transferred
        token: TokenId,
        /// Sender
        from: Address,
        /// Recipient
        to: Address,
        /// Amount
        amount: u128,
    },

    /// Oracle price is stale
    #[error("Price feed {0} is stale")]
    StalePrice(String),

    /// Oracle has no usable price (missing feed or zero price)
    #[error("Invalid price for feed {0}")]
    InvalidPrice(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// A mutating entry point was re-entered while in flight
    #[error("Reentrant call into {0}")]
    Reentrancy(&'static str),

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration could not be read or written
    #[error("Config error: {0}")]
    Config(String),

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ZeroAmount
            | Error::ZeroAddress(_)
            | Error::TokenNotAllowed(_)
            | Error::InvalidParameter { .. } => ErrorCategory::Validation,

            Error::CantLiquidateSelf(_)
            | Error::OnlyProtocolCanLiquidateInsufficientBonus { .. }
            | Error::Unauthorized(_) => ErrorCategory::Authorization,

            Error::InsufficientBalance { .. }
            | Error::InsufficientLiquidity { .. }
            | Error::OverpaidDebt { .. }
            | Error::DebtExceedsBorrowed { .. }
            | Error::InsufficientBalanceToLiquidate { .. } => ErrorCategory::State,

            Error::HealthFactorBroken(_)
            | Error::HealthFactorHealthy(_)
            | Error::HealthFactorNotImproved { .. } => ErrorCategory::Risk,

            Error::TransferFailed { .. } | Error::StalePrice(_) | Error::InvalidPrice(_) => {
                ErrorCategory::External
            }

            Error::Overflow { .. }
            | Error::Reentrancy(_)
            | Error::Lock
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Config(_)
            | Error::InvariantViolation(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if resubmitting after an external change can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StalePrice(_)
                | Error::TransferFailed { .. }
                | Error::InsufficientLiquidity { .. }
                | Error::InsufficientBalanceToLiquidate { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_) | Error::Overflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Validation errors: 1xxx
            Error::ZeroAmount => 1001,
            Error::ZeroAddress(_) => 1002,
            Error::TokenNotAllowed(_) => 1003,
            Error::InvalidParameter { .. } => 1004,

            // Authorization errors: 2xxx
            Error::CantLiquidateSelf(_) => 2001,
            Error::OnlyProtocolCanLiquidateInsufficientBonus { .. } => 2002,
            Error::Unauthorized(_) => 2003,

            // State errors: 3xxx
            Error::InsufficientBalance { .. } => 3001,
            Error::InsufficientLiquidity { .. } => 3002,
            Error::OverpaidDebt { .. } => 3003,
            Error::DebtExceedsBorrowed { .. } => 3004,
            Error::InsufficientBalanceToLiquidate { .. } => 3005,

            // Risk errors: 4xxx
            Error::HealthFactorBroken(_) => 4001,
            Error::HealthFactorHealthy(_) => 4002,
            Error::HealthFactorNotImproved { .. } => 4003,

            // External errors: 5xxx
            Error::TransferFailed { .. } => 5001,
            Error::StalePrice(_) => 5002,
            Error::InvalidPrice(_) => 5003,

            // Internal errors: 9xxx
            Error::Overflow { .. } => 9001,
            Error::Reentrancy(_) => 9002,
            Error::Lock => 9003,
            Error::Serialization(_) => 9004,
            Error::Deserialization(_) => 9005,
            Error::Config(_) => 9006,
            Error::InvariantViolation(_) => 9007,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<Error> {
        let token = TokenId::new("WETH");
        let addr = Address::from_label("alice");
        vec![
            Error::ZeroAmount,
            Error::ZeroAddress("user"),
            Error::TokenNotAllowed(token.clone()),
            Error::InvalidParameter { name: "x".into(), reason: "y".into() },
            Error::CantLiquidateSelf(addr),
            Error::OnlyProtocolCanLiquidateInsufficientBonus { available: 0, needed: 1 },
            Error::Unauthorized("x".into()),
            Error::InsufficientBalance { account: addr, token: token.clone(), requested: 1, available: 0 },
            Error::InsufficientLiquidity { token: token.clone(), requested: 1, available: 0 },
            Error::OverpaidDebt { token: token.clone(), requested: 2, owed: 1 },
            Error::DebtExceedsBorrowed { requested: 2, borrowed: 1 },
            Error::InsufficientBalanceToLiquidate { required: 2, available: 1 },
            Error::HealthFactorBroken(1),
            Error::HealthFactorHealthy(2),
            Error::HealthFactorNotImproved { starting: 1, ending: 1 },
            Error::TransferFailed { token, from: addr, to: addr, amount: 1 },
            Error::StalePrice("ETH/USD".into()),
            Error::InvalidPrice("ETH/USD".into()),
            Error::Overflow { operation: "x".into() },
            Error::Reentrancy("borrow"),
            Error::Lock,
            Error::Serialization("x".into()),
            Error::Deserialization("x".into()),
            Error::Config("x".into()),
            Error::InvariantViolation("x".into()),
        ]
    }

    #[test]
    fn test_error_codes_unique() {
        let codes: Vec<u32> = all_errors().iter().map(Error::code).collect();

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_code_ranges_follow_category() {
        for err in all_errors() {
            let expected = match err.category() {
                ErrorCategory::Validation => 1,
                ErrorCategory::Authorization => 2,
                ErrorCategory::State => 3,
                ErrorCategory::Risk => 4,
                ErrorCategory::External => 5,
                ErrorCategory::Internal => 9,
            };
            assert_eq!(err.code() / 1000, expected, "{err}");
        }
    }

    #[test]
    fn test_error_display_carries_health_factor() {
        let err = Error::HealthFactorBroken(625_000_000_000_000_000);
        assert!(err.to_string().contains("625000000000000000"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::StalePrice("BTC/USD".into()).is_recoverable());
        assert!(!Error::CantLiquidateSelf(Address::from_label("bob")).is_recoverable());
    }
}
