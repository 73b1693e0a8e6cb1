//! Price feed implementation.
//!
//! This module provides the oracle side of the lending core:
//! - The [`PriceOracle`] collaborator contract: price plus staleness flag
//! - [`PriceFeedRegistry`], an in-memory set of USD feeds with 8 decimals
//! - Clocks used to judge staleness

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::config::ProtocolParams;
use crate::core::registry::FeedId;
use crate::error::{Error, Result};
use crate::utils::constants::{FEED_PRECISION, MAX_PRICE_STALENESS_SECS};

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// Answer to an oracle query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// USD price with 8 decimals
    pub price: u128,
    /// True if the price is older than the feed's timeout
    pub is_stale: bool,
}

/// External price source
pub trait PriceOracle {
    /// Latest USD price of `feed`
    fn query(&self, feed: &FeedId) -> Result<PriceQuote>;
}

impl<O: PriceOracle + ?Sized> PriceOracle for Arc<O> {
    fn query(&self, feed: &FeedId) -> Result<PriceQuote> {
        (**self).query(feed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of the current unix time in seconds
pub trait Clock: Send + Sync {
    /// Current unix timestamp
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually advanced clock, shared between handles
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    /// Clock starting at `now`
    pub fn new(now: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now)))
    }

    /// Set the current time
    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A single price data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceData {
    /// USD price with 8 decimals (e.g. 2000_00000000 = $2,000)
    pub price: u128,
    /// Unix timestamp of the update
    pub updated_at: u64,
}

impl PriceData {
    /// Create a new price data point
    pub fn new(price: u128, updated_at: u64) -> Self {
        Self { price, updated_at }
    }

    /// Check if price is fresh
    pub fn is_fresh(&self, current_time: u64, max_age: u64) -> bool {
        self.age(current_time) <= max_age
    }

    /// Get age of price in seconds
    pub fn age(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.updated_at)
    }

    /// Format price for display
    pub fn format_price(&self) -> String {
        let dollars = self.price / FEED_PRECISION;
        let cents = (self.price % FEED_PRECISION) / (FEED_PRECISION / 100);
        format!("${}.{:02}", dollars, cents)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory USD feeds keyed by feed id
pub struct PriceFeedRegistry {
    prices: HashMap<FeedId, PriceData>,
    max_staleness: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PriceFeedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFeedRegistry")
            .field("prices", &self.prices)
            .field("max_staleness", &self.max_staleness)
            .finish()
    }
}

impl Default for PriceFeedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceFeedRegistry {
    /// Registry on the wall clock with the default timeout
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), MAX_PRICE_STALENESS_SECS)
    }

    /// Registry on a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>, max_staleness: u64) -> Self {
        Self {
            prices: HashMap::new(),
            max_staleness,
            clock,
        }
    }

    /// Registry on `clock` with the configured staleness timeout
    pub fn with_params(clock: Arc<dyn Clock>, params: &ProtocolParams) -> Self {
        Self::with_clock(clock, params.max_price_staleness_secs)
    }

    /// Record a price observed now
    pub fn set_price(&mut self, feed: impl Into<FeedId>, price: u128) {
        let now = self.clock.now();
        self.prices.insert(feed.into(), PriceData::new(price, now));
    }

    /// Record a price observed at `updated_at`
    pub fn set_price_at(&mut self, feed: impl Into<FeedId>, price: u128, updated_at: u64) {
        self.prices.insert(feed.into(), PriceData::new(price, updated_at));
    }

    /// Latest data point of `feed`
    pub fn price_data(&self, feed: &str) -> Option<&PriceData> {
        self.prices.get(feed)
    }

    /// Staleness timeout in seconds
    pub fn max_staleness(&self) -> u64 {
        self.max_staleness
    }
}

impl PriceOracle for PriceFeedRegistry {
    fn query(&self, feed: &FeedId) -> Result<PriceQuote> {
        let data = self
            .prices
            .get(feed)
            .ok_or_else(|| Error::InvalidPrice(feed.clone()))?;

        if data.price == 0 {
            return Err(Error::InvalidPrice(feed.clone()));
        }

        let now = self.clock.now();
        let is_stale = !data.is_fresh(now, self.max_staleness);
        if is_stale {
            tracing::warn!(feed = %feed, age = data.age(now), "stale price");
        }

        Ok(PriceQuote {
            price: data.price,
            is_stale,
        })
    }
}

/// Whole-dollar price with 8 decimals
pub fn usd(dollars: u128) -> Result<u128> {
    dollars.checked_mul(FEED_PRECISION).ok_or_else(|| Error::Overflow {
        operation: format!("{} * {}", dollars, FEED_PRECISION),
    })
}
