//! Core modules for overlend.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Allowed-token registry
//! - Token identifiers and the transfer collaborator
//! - Collateral/debt ledger
//! - Risk engine (valuation and health factor)

pub mod config;
pub mod ledger;
pub mod registry;
pub mod risk;
pub mod token;

pub use config::*;
pub use ledger::*;
pub use registry::*;
pub use risk::*;
pub use token::*;
