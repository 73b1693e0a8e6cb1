//! Token identifiers and the token-transfer collaborator.
//!
//! The lending core never moves tokens itself; it asks a [`TokenTransfer`]
//! implementation and treats a `false` result as a failed transfer.
//! [`InMemoryTokens`] is the default implementation: balances and allowances
//! per token, kept in memory and cloneable so a failed call can be undone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::utils::address::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque token identifier (e.g. `"WETH"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(String);

impl TokenId {
    /// Create a token id
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFER COLLABORATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Token movement as seen by the lending core
pub trait TokenTransfer {
    /// Wallet balance of `holder`
    fn balance_of(&self, token: &TokenId, holder: &Address) -> u128;

    /// Move `amount` from `from` (the initiator) to `to`
    fn transfer(&mut self, token: &TokenId, from: &Address, to: &Address, amount: u128) -> bool;

    /// Move `amount` from `from` to `to` on `spender`'s allowance
    fn transfer_from(
        &mut self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> bool;
}

/// In-memory token balances with allowances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryTokens {
    /// token -> holder -> balance
    balances: HashMap<TokenId, HashMap<Address, u128>>,
    /// token -> (owner, spender) -> allowance
    allowances: HashMap<TokenId, HashMap<(Address, Address), u128>>,
    /// tokens whose transfers currently fail
    frozen: Vec<TokenId>,
}

impl InMemoryTokens {
    /// Create an empty token book
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `token` to `to`
    pub fn mint(&mut self, token: &TokenId, to: &Address, amount: u128) {
        let balance = self
            .balances
            .entry(token.clone())
            .or_default()
            .entry(*to)
            .or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Set `spender`'s allowance over `owner`'s `token`
    pub fn approve(&mut self, token: &TokenId, owner: &Address, spender: &Address, amount: u128) {
        self.allowances
            .entry(token.clone())
            .or_default()
            .insert((*owner, *spender), amount);
    }

    /// Current allowance
    pub fn allowance(&self, token: &TokenId, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(token)
            .and_then(|a| a.get(&(*owner, *spender)))
            .copied()
            .unwrap_or(0)
    }

    /// Make every transfer of `token` fail (or succeed again)
    pub fn set_frozen(&mut self, token: &TokenId, frozen: bool) {
        self.frozen.retain(|t| t != token);
        if frozen {
            self.frozen.push(token.clone());
        }
    }

    /// Total units of `token` across all holders
    pub fn total_supply(&self, token: &TokenId) -> u128 {
        self.balances
            .get(token)
            .map(|b| b.values().fold(0u128, |acc, v| acc.saturating_add(*v)))
            .unwrap_or(0)
    }

    fn is_frozen(&self, token: &TokenId) -> bool {
        self.frozen.contains(token)
    }

    fn move_balance(&mut self, token: &TokenId, from: &Address, to: &Address, amount: u128) -> bool {
        let book = self.balances.entry(token.clone()).or_default();
        let from_balance = book.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return false;
        }
        if from == to {
            return true;
        }
        let to_balance = book.get(to).copied().unwrap_or(0);
        let Some(new_to) = to_balance.checked_add(amount) else {
            return false;
        };
        book.insert(*from, from_balance - amount);
        book.insert(*to, new_to);
        true
    }
}

impl TokenTransfer for InMemoryTokens {
    fn balance_of(&self, token: &TokenId, holder: &Address) -> u128 {
        self.balances
            .get(token)
            .and_then(|b| b.get(holder))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, token: &TokenId, from: &Address, to: &Address, amount: u128) -> bool {
        if self.is_frozen(token) {
            return false;
        }
        self.move_balance(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> bool {
        if self.is_frozen(token) {
            return false;
        }
        // Moving one's own tokens needs no allowance
        if spender != from {
            let allowance = self.allowance(token, from, spender);
            if allowance < amount {
                return false;
            }
            if !self.move_balance(token, from, to, amount) {
                return false;
            }
            self.approve(token, from, spender, allowance - amount);
            return true;
        }
        self.move_balance(token, from, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> TokenId {
        TokenId::new("WETH")
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut tokens = InMemoryTokens::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        tokens.mint(&weth(), &alice, 100);
        assert!(tokens.transfer(&weth(), &alice, &bob, 40));
        assert_eq!(tokens.balance_of(&weth(), &alice), 60);
        assert_eq!(tokens.balance_of(&weth(), &bob), 40);
        assert_eq!(tokens.total_supply(&weth()), 100);
    }

    #[test]
    fn test_transfer_insufficient_balance_fails() {
        let mut tokens = InMemoryTokens::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        tokens.mint(&weth(), &alice, 10);
        assert!(!tokens.transfer(&weth(), &alice, &bob, 11));
        assert_eq!(tokens.balance_of(&weth(), &alice), 10);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut tokens = InMemoryTokens::new();
        let alice = Address::from_label("alice");
        let pool = Address::from_label("pool");

        tokens.mint(&weth(), &alice, 100);
        assert!(!tokens.transfer_from(&weth(), &pool, &alice, &pool, 50));

        tokens.approve(&weth(), &alice, &pool, 70);
        assert!(tokens.transfer_from(&weth(), &pool, &alice, &pool, 50));
        assert_eq!(tokens.allowance(&weth(), &alice, &pool), 20);
        assert_eq!(tokens.balance_of(&weth(), &pool), 50);
    }

    #[test]
    fn test_frozen_token_fails() {
        let mut tokens = InMemoryTokens::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        tokens.mint(&weth(), &alice, 100);
        tokens.set_frozen(&weth(), true);
        assert!(!tokens.transfer(&weth(), &alice, &bob, 1));

        tokens.set_frozen(&weth(), false);
        assert!(tokens.transfer(&weth(), &alice, &bob, 1));
    }
}
