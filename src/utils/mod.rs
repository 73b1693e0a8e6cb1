//! Utility modules for overlend.
//!
//! This module contains shared utilities used across the protocol:
//! - Account addresses
//! - Fixed-point arithmetic
//! - Validation helpers
//! - Constants

pub mod address;
pub mod constants;
pub mod math;
pub mod validation;

pub use address::*;
pub use constants::*;
pub use math::*;
pub use validation::*;
