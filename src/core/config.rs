//! Protocol configuration and parameters.
//!
//! Parameters are fixed at construction:
//! - Risk parameters: threshold, bonus and precisions
//! - Accounts: protocol custody and the admin allowed to trigger
//!   protocol-initiated liquidations
//! - Token registry: allowed tokens and their oracle feeds

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::registry::TokenBinding;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::constants::*;
use crate::utils::validation::validate_percentage;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Risk and precision parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Share of collateral value counted toward solvency (percent)
    pub liquidation_threshold: u128,

    /// Denominator of threshold and bonus
    pub liquidation_precision: u128,

    /// Liquidator bonus on the repaid debt value (percent)
    pub liquidation_bonus: u128,

    /// Health factor below which a position is liquidatable
    pub min_health_factor: u128,

    /// Fixed-point scale of USD values and health factors
    pub precision: u128,

    /// Bridges feed decimals to `precision`
    pub additional_feed_precision: u128,

    /// Maximum price staleness in seconds
    pub max_price_staleness_secs: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            liquidation_threshold: LIQUIDATION_THRESHOLD,
            liquidation_precision: LIQUIDATION_PRECISION,
            liquidation_bonus: LIQUIDATION_BONUS,
            min_health_factor: MIN_HEALTH_FACTOR,
            precision: PRECISION,
            additional_feed_precision: ADDITIONAL_FEED_PRECISION,
            max_price_staleness_secs: MAX_PRICE_STALENESS_SECS,
        }
    }
}

impl ProtocolParams {
    /// Override the liquidation threshold (for testing)
    pub fn with_threshold(mut self, threshold: u128) -> Self {
        self.liquidation_threshold = threshold;
        self
    }

    /// Override the liquidation bonus (for testing)
    pub fn with_bonus(mut self, bonus: u128) -> Self {
        self.liquidation_bonus = bonus;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        validate_percentage(
            self.liquidation_threshold,
            self.liquidation_precision,
            "liquidation_threshold",
        )?;
        if self.liquidation_threshold == 0 {
            return Err(Error::InvalidParameter {
                name: "liquidation_threshold".into(),
                reason: "must be positive".into(),
            });
        }
        if self.liquidation_bonus >= self.liquidation_precision {
            return Err(Error::InvalidParameter {
                name: "liquidation_bonus".into(),
                reason: format!(
                    "{} must be below {}",
                    self.liquidation_bonus, self.liquidation_precision
                ),
            });
        }
        if self.precision == 0 || self.additional_feed_precision == 0 {
            return Err(Error::InvalidParameter {
                name: "precision".into(),
                reason: "must be positive".into(),
            });
        }
        if self.min_health_factor == 0 {
            return Err(Error::InvalidParameter {
                name: "min_health_factor".into(),
                reason: "must be positive".into(),
            });
        }
        if self.max_price_staleness_secs == 0 {
            return Err(Error::InvalidParameter {
                name: "max_price_staleness_secs".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Risk parameters
    pub params: ProtocolParams,

    /// Account holding deposited tokens; acts as liquidator on the protocol path
    pub protocol_address: Address,

    /// Account authorised to trigger protocol-initiated liquidations
    pub admin: Address,

    /// Allowed tokens in canonical order
    pub tokens: Vec<TokenBinding>,
}

impl ProtocolConfig {
    /// Create a configuration with default parameters
    pub fn new(protocol_address: Address, admin: Address, tokens: Vec<TokenBinding>) -> Self {
        Self {
            params: ProtocolParams::default(),
            protocol_address,
            admin,
            tokens,
        }
    }

    /// Replace the parameters
    pub fn with_params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply overrides from environment variables
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(secs) = std::env::var("OVERLEND_MAX_PRICE_STALENESS") {
            self.params.max_price_staleness_secs = secs.parse().map_err(|_| {
                Error::Config(format!("OVERLEND_MAX_PRICE_STALENESS: not a number: {secs}"))
            })?;
        }

        if let Ok(admin) = std::env::var("OVERLEND_ADMIN") {
            self.admin = Address::from_hex(&admin)?;
        }

        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;

        if self.protocol_address.is_zero() {
            return Err(Error::ZeroAddress("protocol_address"));
        }
        if self.admin.is_zero() {
            return Err(Error::ZeroAddress("admin"));
        }
        if self.tokens.is_empty() {
            return Err(Error::InvalidParameter {
                name: "tokens".into(),
                reason: "at least one token must be allowed".into(),
            });
        }
        Ok(())
    }
}
