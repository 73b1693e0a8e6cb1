//! Allowed-token registry.
//!
//! A token is allowed iff it is bound to an oracle feed. The registry is built
//! once and never mutated; its order is the canonical iteration order used by
//! valuation and by the liquidation bonus waterfall.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::token::TokenId;
use crate::error::{Error, Result};

/// Identifier of an oracle price feed (e.g. `"ETH/USD"`)
pub type FeedId = String;

/// A token and the feed that prices it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    /// Token identifier
    pub token: TokenId,
    /// Oracle feed pricing the token in USD
    pub feed: FeedId,
}

impl TokenBinding {
    /// Bind `token` to `feed`
    pub fn new(token: impl Into<TokenId>, feed: impl Into<FeedId>) -> Self {
        Self {
            token: token.into(),
            feed: feed.into(),
        }
    }
}

/// Immutable, ordered table of allowed tokens
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    bindings: Vec<TokenBinding>,
    index: HashMap<TokenId, usize>,
}

impl TokenRegistry {
    /// Build the registry; duplicates and empty feeds are rejected
    pub fn new(bindings: Vec<TokenBinding>) -> Result<Self> {
        let mut index = HashMap::with_capacity(bindings.len());
        for (i, binding) in bindings.iter().enumerate() {
            if binding.feed.is_empty() {
                return Err(Error::InvalidParameter {
                    name: "feed".into(),
                    reason: format!("token {} has no price feed", binding.token),
                });
            }
            if index.insert(binding.token.clone(), i).is_some() {
                return Err(Error::InvalidParameter {
                    name: "token".into(),
                    reason: format!("token {} registered twice", binding.token),
                });
            }
        }
        Ok(Self { bindings, index })
    }

    /// True if `token` has a feed binding
    pub fn is_allowed(&self, token: &TokenId) -> bool {
        self.index.contains_key(token)
    }

    /// Fail with `TokenNotAllowed` unless `token` is registered
    pub fn ensure_allowed(&self, token: &TokenId) -> Result<()> {
        if !self.is_allowed(token) {
            return Err(Error::TokenNotAllowed(token.clone()));
        }
        Ok(())
    }

    /// Feed bound to `token`
    pub fn feed_for(&self, token: &TokenId) -> Result<&FeedId> {
        self.index
            .get(token)
            .map(|&i| &self.bindings[i].feed)
            .ok_or_else(|| Error::TokenNotAllowed(token.clone()))
    }

    /// Tokens in canonical order
    pub fn tokens(&self) -> impl Iterator<Item = &TokenId> {
        self.bindings.iter().map(|b| &b.token)
    }

    /// Bindings in canonical order
    pub fn bindings(&self) -> &[TokenBinding] {
        &self.bindings
    }

    /// Number of allowed tokens
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if no token is allowed
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
