//! Thread-safe protocol handle.
//!
//! Every call takes the protocol lock for its whole read-check-mutate-transfer
//! sequence, so concurrent callers are serialised. A poisoned lock is reported
//! as [`Error::Lock`].

use std::sync::{Arc, Mutex};

use crate::core::token::{TokenId, TokenTransfer};
use crate::error::{Error, Result};
use crate::liquidation::engine::LiquidationOutcome;
use crate::oracle::PriceOracle;
use crate::protocol::lending::LendingProtocol;
use crate::utils::address::Address;

/// Cloneable handle to one protocol instance
pub struct SharedProtocol<O: PriceOracle, T: TokenTransfer + Clone> {
    inner: Arc<Mutex<LendingProtocol<O, T>>>,
}

impl<O: PriceOracle, T: TokenTransfer + Clone> Clone for SharedProtocol<O, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: PriceOracle, T: TokenTransfer + Clone> SharedProtocol<O, T> {
    /// Wrap a protocol
    pub fn new(protocol: LendingProtocol<O, T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(protocol)),
        }
    }

    /// Run `f` with exclusive access
    pub fn execute<R>(&self, f: impl FnOnce(&mut LendingProtocol<O, T>) -> Result<R>) -> Result<R> {
        let mut guard = self.inner.lock().map_err(|_| Error::Lock)?;
        f(&mut guard)
    }

    /// Run a read-only `f`
    pub fn read<R>(&self, f: impl FnOnce(&LendingProtocol<O, T>) -> R) -> Result<R> {
        let guard = self.inner.lock().map_err(|_| Error::Lock)?;
        Ok(f(&guard))
    }

    /// See [`LendingProtocol::deposit_collateral`]
    pub fn deposit_collateral(&self, user: Address, token: impl Into<TokenId>, amount: u128) -> Result<()> {
        self.execute(|p| p.deposit_collateral(user, token, amount))
    }

    /// See [`LendingProtocol::borrow`]
    pub fn borrow(&self, user: Address, token: impl Into<TokenId>, amount: u128) -> Result<()> {
        self.execute(|p| p.borrow(user, token, amount))
    }

    /// See [`LendingProtocol::repay`]
    pub fn repay(
        &self,
        payer: Address,
        token: impl Into<TokenId>,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<()> {
        self.execute(|p| p.repay(payer, token, amount, on_behalf_of))
    }

    /// See [`LendingProtocol::withdraw`]
    pub fn withdraw(&self, user: Address, token: impl Into<TokenId>, amount: u128) -> Result<()> {
        self.execute(|p| p.withdraw(user, token, amount))
    }

    /// See [`LendingProtocol::deposit_and_borrow`]
    pub fn deposit_and_borrow(
        &self,
        user: Address,
        collateral_token: impl Into<TokenId>,
        collateral_amount: u128,
        debt_token: impl Into<TokenId>,
        amount: u128,
    ) -> Result<()> {
        self.execute(|p| p.deposit_and_borrow(user, collateral_token, collateral_amount, debt_token, amount))
    }

    /// See [`LendingProtocol::repay_and_withdraw`]
    pub fn repay_and_withdraw(
        &self,
        user: Address,
        debt_token: impl Into<TokenId>,
        debt_amount: u128,
        collateral_token: impl Into<TokenId>,
        collateral_amount: u128,
    ) -> Result<()> {
        self.execute(|p| p.repay_and_withdraw(user, debt_token, debt_amount, collateral_token, collateral_amount))
    }

    /// See [`LendingProtocol::liquidate`]
    pub fn liquidate(
        &self,
        caller: Address,
        user: Address,
        collateral_token: impl Into<TokenId>,
        debt_token: impl Into<TokenId>,
        debt_to_cover: u128,
    ) -> Result<LiquidationOutcome> {
        self.execute(|p| p.liquidate(caller, user, collateral_token, debt_token, debt_to_cover))
    }

    /// See [`LendingProtocol::protocol_liquidate`]
    pub fn protocol_liquidate(
        &self,
        admin: Address,
        user: Address,
        collateral_token: impl Into<TokenId>,
        debt_token: impl Into<TokenId>,
        debt_to_cover: u128,
    ) -> Result<LiquidationOutcome> {
        self.execute(|p| p.protocol_liquidate(admin, user, collateral_token, debt_token, debt_to_cover))
    }

    /// See [`LendingProtocol::health_factor`]
    pub fn health_factor(&self, user: &Address) -> Result<u128> {
        self.read(|p| p.health_factor(user))?
    }
}
