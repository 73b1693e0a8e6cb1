//! Settlement executor.
//!
//! Performs ledger mutations and token transfers in the order each operation
//! requires. The executor does not roll anything back itself: a failed step
//! returns an error and the enclosing transaction restores the snapshot taken
//! on entry.
//!
//! Ordering rules:
//! - borrow: debt and global total up, health check, then transfer out
//! - repay: debt and global total down, then pull tokens in
//! - withdraw: collateral down, health check, then transfer out
//! - liquidation: collateral seized first, debt reduced and paid afterwards

use crate::core::ledger::{CollateralStore, DebtStore, Ledger};
use crate::core::risk::RiskEngine;
use crate::core::token::{TokenId, TokenTransfer};
use crate::error::{Error, Result};
use crate::oracle::PriceOracle;
use crate::utils::address::Address;
use crate::utils::validation::{validate_address, validate_non_zero};

/// Who ends up holding seized collateral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The external liquidator; tokens leave protocol custody
    Caller(Address),
    /// The protocol itself; tokens stay in custody on the protocol account
    Protocol,
}

/// Unborrowed units of `token`: custody balance minus global borrowed total
pub fn available_liquidity<T: TokenTransfer + ?Sized>(
    ledger: &Ledger,
    tokens: &T,
    custody: &Address,
    token: &TokenId,
) -> u128 {
    tokens
        .balance_of(token, custody)
        .saturating_sub(ledger.total_borrowed(token))
}

/// Mutating view over the ledger and the token collaborator
pub struct SettlementExecutor<'a, T: TokenTransfer + ?Sized> {
    ledger: &'a mut Ledger,
    tokens: &'a mut T,
    custody: Address,
}

impl<'a, T: TokenTransfer + ?Sized> SettlementExecutor<'a, T> {
    /// Executor moving tokens in and out of `custody`
    pub fn new(ledger: &'a mut Ledger, tokens: &'a mut T, custody: Address) -> Self {
        Self {
            ledger,
            tokens,
            custody,
        }
    }

    /// Ledger as seen so far in this call
    pub fn ledger(&self) -> &Ledger {
        &*self.ledger
    }

    /// Token collaborator
    pub fn tokens(&self) -> &T {
        &*self.tokens
    }

    /// Protocol custody account
    pub fn custody(&self) -> &Address {
        &self.custody
    }

    /// Unborrowed units of `token` held in custody
    pub fn available_liquidity(&self, token: &TokenId) -> u128 {
        available_liquidity(&*self.ledger, &*self.tokens, &self.custody, token)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSFERS
    // ═══════════════════════════════════════════════════════════════════════════

    fn send(&mut self, token: &TokenId, to: &Address, amount: u128) -> Result<()> {
        if !self.tokens.transfer(token, &self.custody, to, amount) {
            return Err(Error::TransferFailed {
                token: token.clone(),
                from: self.custody,
                to: *to,
                amount,
            });
        }
        Ok(())
    }

    fn pull(&mut self, token: &TokenId, from: &Address, amount: u128) -> Result<()> {
        let custody = self.custody;
        if !self.tokens.transfer_from(token, &custody, from, &custody, amount) {
            return Err(Error::TransferFailed {
                token: token.clone(),
                from: *from,
                to: custody,
                amount,
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // USER OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Credit collateral and pull the tokens into custody
    pub fn deposit<O: PriceOracle + ?Sized>(
        &mut self,
        risk: &RiskEngine<'_, O>,
        user: &Address,
        token: &TokenId,
        amount: u128,
    ) -> Result<()> {
        validate_address(user, "user")?;
        validate_non_zero(amount)?;
        risk.registry().ensure_allowed(token)?;

        self.ledger.increase_collateral(user, token, amount)?;
        self.pull(token, user, amount)
    }

    /// Open or grow debt and send the borrowed tokens out
    pub fn borrow<O: PriceOracle + ?Sized>(
        &mut self,
        risk: &RiskEngine<'_, O>,
        borrower: &Address,
        token: &TokenId,
        amount: u128,
    ) -> Result<()> {
        validate_address(borrower, "borrower")?;
        validate_non_zero(amount)?;
        risk.registry().ensure_allowed(token)?;

        let available = self.available_liquidity(token);
        if available < amount {
            return Err(Error::InsufficientLiquidity {
                token: token.clone(),
                requested: amount,
                available,
            });
        }

        self.ledger.increase_debt(borrower, token, amount)?;
        risk.assert_healthy(&*self.ledger, borrower)?;
        self.send(token, borrower, amount)
    }

    /// Reduce `on_behalf_of`'s debt, then pull the tokens from `payer`
    pub fn repay<O: PriceOracle + ?Sized>(
        &mut self,
        risk: &RiskEngine<'_, O>,
        payer: &Address,
        on_behalf_of: &Address,
        token: &TokenId,
        amount: u128,
    ) -> Result<()> {
        validate_address(payer, "payer")?;
        validate_address(on_behalf_of, "on_behalf_of")?;
        validate_non_zero(amount)?;
        risk.registry().ensure_allowed(token)?;

        let owed = self.ledger.debt_of(on_behalf_of, token);
        if amount > owed {
            return Err(Error::OverpaidDebt {
                token: token.clone(),
                requested: amount,
                owed,
            });
        }

        self.ledger.decrease_debt(on_behalf_of, token, amount)?;
        self.pull(token, payer, amount)?;
        risk.assert_healthy(&*self.ledger, on_behalf_of)
    }

    /// Release collateral to its owner
    pub fn withdraw<O: PriceOracle + ?Sized>(
        &mut self,
        risk: &RiskEngine<'_, O>,
        owner: &Address,
        token: &TokenId,
        amount: u128,
    ) -> Result<()> {
        validate_address(owner, "owner")?;
        validate_non_zero(amount)?;
        risk.registry().ensure_allowed(token)?;

        self.ledger.decrease_collateral(owner, token, amount)?;
        risk.assert_healthy(&*self.ledger, owner)?;
        self.send(token, owner, amount)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION STEPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move collateral from `user` onto the protocol account; tokens stay put
    pub fn move_to_custody(&mut self, user: &Address, token: &TokenId, amount: u128) -> Result<()> {
        self.ledger.decrease_collateral(user, token, amount)?;
        let custody = self.custody;
        self.ledger.increase_collateral(&custody, token, amount)
    }

    /// Take collateral from `user` and hand it to `recipient`
    pub fn seize(
        &mut self,
        user: &Address,
        token: &TokenId,
        amount: u128,
        recipient: Recipient,
    ) -> Result<()> {
        match recipient {
            Recipient::Protocol => self.move_to_custody(user, token, amount),
            Recipient::Caller(to) => {
                self.ledger.decrease_collateral(user, token, amount)?;
                self.send(token, &to, amount)
            }
        }
    }

    /// Pay collateral held on the protocol account out to `to`
    pub fn release_from_custody(&mut self, token: &TokenId, to: &Address, amount: u128) -> Result<()> {
        let custody = self.custody;
        self.ledger.decrease_collateral(&custody, token, amount)?;
        self.send(token, to, amount)
    }

    /// Reduce `user`'s debt and pull the repayment from `payer`
    pub fn settle_debt(
        &mut self,
        user: &Address,
        payer: &Address,
        token: &TokenId,
        amount: u128,
    ) -> Result<()> {
        self.ledger.decrease_debt(user, token, amount)?;
        self.pull(token, payer, amount)
    }
}
