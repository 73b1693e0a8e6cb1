//! Liquidation module for overlend.
//!
//! This module handles liquidations of unhealthy positions:
//! - Liquidation engine (eligibility, bonus sizing, settlement)
//! - Bonus waterfall across secondary collateral

pub mod engine;
pub mod waterfall;

pub use engine::*;
pub use waterfall::*;
