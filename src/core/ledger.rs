//! Collateral and debt ledger.
//!
//! Per-user-per-token collateral and debt balances plus the per-token global
//! borrowed total. Balances are unsigned; a decrease past zero fails with
//! `InsufficientBalance` and leaves the balance untouched. The global total
//! moves together with every debt change and is never rebuilt by scanning.
//!
//! Readers and writers see the ledger through two capability traits,
//! [`CollateralStore`] and [`DebtStore`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::token::TokenId;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Read/write access to collateral balances
pub trait CollateralStore {
    /// Collateral of `user` in `token`
    fn collateral_of(&self, user: &Address, token: &TokenId) -> u128;

    /// Add collateral
    fn increase_collateral(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()>;

    /// Remove collateral; fails if `amount` exceeds the balance
    fn decrease_collateral(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()>;
}

/// Read/write access to debt balances and the global borrowed totals
pub trait DebtStore {
    /// Debt of `user` in `token`
    fn debt_of(&self, user: &Address, token: &TokenId) -> u128;

    /// Sum of every user's debt in `token`
    fn total_borrowed(&self, token: &TokenId) -> u128;

    /// Add debt and the same amount to the global total
    fn increase_debt(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()>;

    /// Remove debt and the same amount from the global total
    fn decrease_debt(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances of a single user, in native token units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// token -> collateral
    pub collateral: BTreeMap<TokenId, u128>,
    /// token -> debt
    pub debt: BTreeMap<TokenId, u128>,
}

impl Position {
    /// True if the position holds neither collateral nor debt
    pub fn is_empty(&self) -> bool {
        self.collateral.values().all(|v| *v == 0) && self.debt.values().all(|v| *v == 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// The single owned ledger shared by risk and liquidation logic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    positions: HashMap<Address, Position>,
    total_borrowed: HashMap<TokenId, u128>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `user`, if one was ever created
    pub fn position(&self, user: &Address) -> Option<&Position> {
        self.positions.get(user)
    }

    /// True if `user` holds any collateral or debt
    pub fn has_position(&self, user: &Address) -> bool {
        self.positions.get(user).is_some_and(|p| !p.is_empty())
    }

    /// Every account that ever held a position
    pub fn accounts(&self) -> impl Iterator<Item = &Address> {
        self.positions.keys()
    }

    /// Check `sum_u debt[u][t] == total_borrowed[t]` for every token
    pub fn verify_invariants(&self) -> Result<()> {
        let mut sums: HashMap<&TokenId, u128> = HashMap::new();
        for position in self.positions.values() {
            for (token, debt) in &position.debt {
                let sum = sums.entry(token).or_insert(0);
                *sum = safe_add(*sum, *debt)?;
            }
        }

        for (token, total) in &self.total_borrowed {
            let sum = sums.remove(token).unwrap_or(0);
            if sum != *total {
                return Err(Error::InvariantViolation(format!(
                    "{} debt sum {} != total borrowed {}",
                    token, sum, total
                )));
            }
        }

        if let Some((token, sum)) = sums.into_iter().find(|(_, sum)| *sum > 0) {
            return Err(Error::InvariantViolation(format!(
                "{} debt sum {} has no total",
                token, sum
            )));
        }
        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    fn balance(map: &BTreeMap<TokenId, u128>, token: &TokenId) -> u128 {
        map.get(token).copied().unwrap_or(0)
    }

    fn decrease(
        map: &mut BTreeMap<TokenId, u128>,
        account: &Address,
        token: &TokenId,
        amount: u128,
    ) -> Result<()> {
        let available = Self::balance(map, token);
        if amount > available {
            return Err(Error::InsufficientBalance {
                account: *account,
                token: token.clone(),
                requested: amount,
                available,
            });
        }
        map.insert(token.clone(), available - amount);
        Ok(())
    }
}

impl CollateralStore for Ledger {
    fn collateral_of(&self, user: &Address, token: &TokenId) -> u128 {
        self.positions
            .get(user)
            .map(|p| Self::balance(&p.collateral, token))
            .unwrap_or(0)
    }

    fn increase_collateral(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()> {
        let position = self.positions.entry(*user).or_default();
        let new_balance = safe_add(Self::balance(&position.collateral, token), amount)?;
        position.collateral.insert(token.clone(), new_balance);
        Ok(())
    }

    fn decrease_collateral(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()> {
        match self.positions.get_mut(user) {
            Some(position) => Self::decrease(&mut position.collateral, user, token, amount),
            None if amount == 0 => Ok(()),
            None => Err(Error::InsufficientBalance {
                account: *user,
                token: token.clone(),
                requested: amount,
                available: 0,
            }),
        }
    }
}

impl DebtStore for Ledger {
    fn debt_of(&self, user: &Address, token: &TokenId) -> u128 {
        self.positions
            .get(user)
            .map(|p| Self::balance(&p.debt, token))
            .unwrap_or(0)
    }

    fn total_borrowed(&self, token: &TokenId) -> u128 {
        self.total_borrowed.get(token).copied().unwrap_or(0)
    }

    fn increase_debt(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()> {
        let new_total = safe_add(self.total_borrowed(token), amount)?;
        let position = self.positions.entry(*user).or_default();
        let new_debt = safe_add(Self::balance(&position.debt, token), amount)?;

        position.debt.insert(token.clone(), new_debt);
        self.total_borrowed.insert(token.clone(), new_total);
        Ok(())
    }

    fn decrease_debt(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()> {
        let total = self.total_borrowed(token);
        match self.positions.get_mut(user) {
            Some(position) => Self::decrease(&mut position.debt, user, token, amount)?,
            None if amount == 0 => return Ok(()),
            None => {
                return Err(Error::InsufficientBalance {
                    account: *user,
                    token: token.clone(),
                    requested: amount,
                    available: 0,
                })
            }
        }
        let new_total = safe_sub(total, amount).map_err(|_| {
            Error::InvariantViolation(format!("{} total borrowed {} < repaid {}", token, total, amount))
        })?;
        self.total_borrowed.insert(token.clone(), new_total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> TokenId {
        TokenId::new("WETH")
    }

    fn usdc() -> TokenId {
        TokenId::new("USDC")
    }

    #[test]
    fn test_collateral_increase_decrease() {
        let mut ledger = Ledger::new();
        let alice = Address::from_label("alice");

        ledger.increase_collateral(&alice, &weth(), 100).unwrap();
        ledger.decrease_collateral(&alice, &weth(), 40).unwrap();
        assert_eq!(ledger.collateral_of(&alice, &weth()), 60);
    }

    #[test]
    fn test_decrease_below_zero_fails_and_keeps_balance() {
        let mut ledger = Ledger::new();
        let alice = Address::from_label("alice");

        ledger.increase_collateral(&alice, &weth(), 10).unwrap();
        let err = ledger.decrease_collateral(&alice, &weth(), 11).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientBalance {
                account: alice,
                token: weth(),
                requested: 11,
                available: 10,
            }
        );
        assert_eq!(ledger.collateral_of(&alice, &weth()), 10);
    }

    #[test]
    fn test_decrease_unknown_user_fails() {
        let mut ledger = Ledger::new();
        let ghost = Address::from_label("ghost");
        assert!(ledger.decrease_debt(&ghost, &usdc(), 1).is_err());
        assert!(ledger.decrease_collateral(&ghost, &weth(), 1).is_err());
    }

    #[test]
    fn test_debt_tracks_global_total() {
        let mut ledger = Ledger::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        ledger.increase_debt(&alice, &usdc(), 500).unwrap();
        ledger.increase_debt(&bob, &usdc(), 300).unwrap();
        assert_eq!(ledger.total_borrowed(&usdc()), 800);

        ledger.decrease_debt(&alice, &usdc(), 200).unwrap();
        assert_eq!(ledger.debt_of(&alice, &usdc()), 300);
        assert_eq!(ledger.total_borrowed(&usdc()), 600);
        ledger.verify_invariants().unwrap();
    }

    #[test]
    fn test_failed_debt_decrease_leaves_total() {
        let mut ledger = Ledger::new();
        let alice = Address::from_label("alice");

        ledger.increase_debt(&alice, &usdc(), 100).unwrap();
        assert!(ledger.decrease_debt(&alice, &usdc(), 101).is_err());
        assert_eq!(ledger.total_borrowed(&usdc()), 100);
        ledger.verify_invariants().unwrap();
    }

    #[test]
    fn test_has_position() {
        let mut ledger = Ledger::new();
        let alice = Address::from_label("alice");
        assert!(!ledger.has_position(&alice));

        ledger.increase_collateral(&alice, &weth(), 1).unwrap();
        assert!(ledger.has_position(&alice));

        ledger.decrease_collateral(&alice, &weth(), 1).unwrap();
        assert!(!ledger.has_position(&alice));
    }

    #[test]
    fn test_bytes_roundtrip_preserves_totals() {
        let mut ledger = Ledger::new();
        let alice = Address::from_label("alice");
        ledger.increase_collateral(&alice, &weth(), 5).unwrap();
        ledger.increase_debt(&alice, &usdc(), 7).unwrap();

        let restored = Ledger::from_bytes(&ledger.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, ledger);
        assert_eq!(restored.total_borrowed(&usdc()), 7);
    }
}
