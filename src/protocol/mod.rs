//! Protocol module - public operations and orchestration.
//!
//! This module wires the ledger, risk engine and liquidation engine into
//! atomic operations:
//! - Lending facade with all-or-nothing calls
//! - Settlement executor (mandated mutation and transfer order)
//! - Reentrancy guard
//! - Event log
//! - Thread-safe shared handle

pub mod events;
pub mod executor;
pub mod guard;
pub mod lending;
pub mod shared;

pub use events::*;
pub use executor::*;
pub use guard::*;
pub use lending::*;
pub use shared::*;
