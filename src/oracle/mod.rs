//! Oracle module for price feeds.
//!
//! The lending core only needs a USD price and a staleness flag per feed;
//! stale prices are rejected by the risk engine.

pub mod price_feed;

pub use price_feed::*;
