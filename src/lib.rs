//! # overlend
//!
//! Core of an over-collateralized, multi-token lending protocol. Users deposit
//! collateral tokens and borrow other tokens against them; positions whose
//! health factor falls below the minimum are liquidated by third parties, or
//! by the protocol itself, in exchange for collateral plus a bonus.
//!
//! ## Architecture
//!
//! - **Core**: configuration, token registry, ledger and risk engine
//! - **Oracle**: USD price feeds with staleness checks
//! - **Liquidation**: liquidation engine and the bonus waterfall
//! - **Protocol**: atomic public operations, settlement ordering, events
//!
//! ## Example
//!
//! ```rust,ignore
//! use overlend::prelude::*;
//!
//! let mut protocol = LendingProtocol::new(config, feeds, tokens)?;
//! protocol.deposit_collateral(alice, "WETH", 5 * PRECISION)?;
//! protocol.borrow(alice, "USDC", 2_000 * PRECISION)?;
//! assert!(protocol.health_factor(&alice)? >= MIN_HEALTH_FACTOR);
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::{ProtocolConfig, ProtocolParams},
        ledger::{CollateralStore, DebtStore, Ledger, Position},
        registry::{TokenBinding, TokenRegistry},
        risk::{calculate_health_factor, RiskEngine},
        token::{InMemoryTokens, TokenId, TokenTransfer},
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::liquidation::{
        engine::{ActingAs, LiquidationEngine, LiquidationOutcome, LiquidationRequest},
        waterfall::BonusDraw,
    };
    pub use crate::oracle::price_feed::{
        usd, Clock, ManualClock, PriceFeedRegistry, PriceOracle, PriceQuote, SystemClock,
    };
    pub use crate::protocol::{
        events::{EventLog, ProtocolEvent},
        lending::{LendingProtocol, PositionSummary},
        shared::SharedProtocol,
    };
    pub use crate::utils::{
        address::Address,
        constants::{MIN_HEALTH_FACTOR, PRECISION},
    };
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "overlend";
