//! Lending protocol facade.
//!
//! Owns the ledger, the token collaborator, the event log and the liquidation
//! engine, and exposes the public operations. Every mutating operation runs as
//! one transaction: the reentrancy guard is held for the whole call and the
//! state is restored to its entry snapshot if any step fails.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolConfig;
use crate::core::ledger::{CollateralStore, DebtStore, Ledger};
use crate::core::registry::TokenRegistry;
use crate::core::risk::{self, RiskEngine};
use crate::core::token::{TokenId, TokenTransfer};
use crate::error::{Error, Result};
use crate::liquidation::engine::{
    ActingAs, LiquidationEngine, LiquidationOutcome, LiquidationRequest, LiquidationStats,
};
use crate::oracle::PriceOracle;
use crate::protocol::events::{EventLog, ProtocolEvent};
use crate::protocol::executor::{available_liquidity, SettlementExecutor};
use crate::protocol::guard::ReentrancyGuard;
use crate::utils::address::Address;
use crate::utils::math::to_decimal;

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a failed call must leave untouched
#[derive(Debug, Clone)]
struct ProtocolState<T> {
    ledger: Ledger,
    tokens: T,
    events: EventLog,
    liquidations: LiquidationEngine,
}

/// Handles available to an operation while its transaction is open
struct Tx<'a, O: PriceOracle, T: TokenTransfer> {
    risk: RiskEngine<'a, O>,
    exec: SettlementExecutor<'a, T>,
    events: &'a mut EventLog,
    liquidations: &'a mut LiquidationEngine,
}

/// Balances, USD totals and health of one position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    /// Position owner
    pub user: Address,
    /// Nonzero collateral balances in registry order
    pub collateral: Vec<(TokenId, u128)>,
    /// Nonzero debt balances in registry order
    pub debt: Vec<(TokenId, u128)>,
    /// USD value of the collateral
    pub collateral_usd: u128,
    /// USD value of the debt
    pub debt_usd: u128,
    /// Health factor scaled by 1e18
    pub health_factor: u128,
    /// Health factor as a decimal; `None` without debt
    pub health_factor_decimal: Option<Decimal>,
}

impl PositionSummary {
    /// True if the position may be liquidated
    pub fn is_liquidatable(&self, min_health_factor: u128) -> bool {
        self.health_factor < min_health_factor
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LENDING PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Over-collateralized lending protocol
pub struct LendingProtocol<O: PriceOracle, T: TokenTransfer + Clone> {
    config: ProtocolConfig,
    registry: TokenRegistry,
    oracle: O,
    state: ProtocolState<T>,
    guard: ReentrancyGuard,
}

impl<O: PriceOracle, T: TokenTransfer + Clone> LendingProtocol<O, T> {
    /// Create a protocol over a validated configuration
    pub fn new(config: ProtocolConfig, oracle: O, tokens: T) -> Result<Self> {
        config.validate()?;
        let registry = TokenRegistry::new(config.tokens.clone())?;

        tracing::info!(
            protocol = %config.protocol_address,
            tokens = registry.len(),
            "lending protocol initialised"
        );

        Ok(Self {
            config,
            registry,
            oracle,
            state: ProtocolState {
                ledger: Ledger::new(),
                tokens,
                events: EventLog::default(),
                liquidations: LiquidationEngine::new(),
            },
            guard: ReentrancyGuard::new(),
        })
    }

    /// Run `op` as one all-or-nothing call
    fn atomically<R, F>(&mut self, entry: &'static str, op: F) -> Result<R>
    where
        F: FnOnce(&mut Tx<'_, O, T>) -> Result<R>,
    {
        let _scope = self.guard.enter(entry)?;
        let snapshot = self.state.clone();

        let state = &mut self.state;
        let mut tx = Tx {
            risk: RiskEngine::new(&self.registry, &self.oracle, &self.config.params),
            exec: SettlementExecutor::new(
                &mut state.ledger,
                &mut state.tokens,
                self.config.protocol_address,
            ),
            events: &mut state.events,
            liquidations: &mut state.liquidations,
        };
        let result = op(&mut tx);
        drop(tx);

        match result {
            Ok(value) => {
                tracing::info!(entry, "committed");
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(
                    entry,
                    error = %e,
                    code = e.code(),
                    critical = e.is_critical(),
                    "rolled back"
                );
                self.state = snapshot;
                Err(e)
            }
        }
    }

    fn risk(&self) -> RiskEngine<'_, O> {
        RiskEngine::new(&self.registry, &self.oracle, &self.config.params)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // USER OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit `amount` of `token` as collateral
    pub fn deposit_collateral(&mut self, user: Address, token: impl Into<TokenId>, amount: u128) -> Result<()> {
        let token = token.into();
        self.atomically("deposit_collateral", |tx| {
            tx.exec.deposit(&tx.risk, &user, &token, amount)?;
            tx.events.record(ProtocolEvent::CollateralDeposited {
                user,
                token: token.clone(),
                amount,
            });
            Ok(())
        })
    }

    /// Borrow `amount` of `token` against `user`'s collateral
    pub fn borrow(&mut self, user: Address, token: impl Into<TokenId>, amount: u128) -> Result<()> {
        let token = token.into();
        self.atomically("borrow", |tx| {
            tx.exec.borrow(&tx.risk, &user, &token, amount)?;
            tx.events.record(ProtocolEvent::Borrowed {
                user,
                token: token.clone(),
                amount,
            });
            Ok(())
        })
    }

    /// Repay `amount` of `on_behalf_of`'s `token` debt from `payer`'s balance
    pub fn repay(
        &mut self,
        payer: Address,
        token: impl Into<TokenId>,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<()> {
        let token = token.into();
        self.atomically("repay", |tx| {
            tx.exec.repay(&tx.risk, &payer, &on_behalf_of, &token, amount)?;
            tx.events.record(ProtocolEvent::Repaid {
                payer,
                on_behalf_of,
                token: token.clone(),
                amount,
            });
            Ok(())
        })
    }

    /// Withdraw `amount` of `token` collateral back to `user`
    pub fn withdraw(&mut self, user: Address, token: impl Into<TokenId>, amount: u128) -> Result<()> {
        let token = token.into();
        self.atomically("withdraw", |tx| {
            tx.exec.withdraw(&tx.risk, &user, &token, amount)?;
            tx.events.record(ProtocolEvent::CollateralWithdrawn {
                user,
                token: token.clone(),
                amount,
            });
            Ok(())
        })
    }

    /// Deposit collateral and borrow against it in one call
    pub fn deposit_and_borrow(
        &mut self,
        user: Address,
        collateral_token: impl Into<TokenId>,
        collateral_amount: u128,
        debt_token: impl Into<TokenId>,
        amount: u128,
    ) -> Result<()> {
        let (collateral_token, debt_token) = (collateral_token.into(), debt_token.into());
        self.atomically("deposit_and_borrow", |tx| {
            tx.exec.deposit(&tx.risk, &user, &collateral_token, collateral_amount)?;
            tx.exec.borrow(&tx.risk, &user, &debt_token, amount)?;
            tx.events.record(ProtocolEvent::CollateralDeposited {
                user,
                token: collateral_token.clone(),
                amount: collateral_amount,
            });
            tx.events.record(ProtocolEvent::Borrowed {
                user,
                token: debt_token.clone(),
                amount,
            });
            Ok(())
        })
    }

    /// Repay own debt and withdraw collateral in one call
    pub fn repay_and_withdraw(
        &mut self,
        user: Address,
        debt_token: impl Into<TokenId>,
        debt_amount: u128,
        collateral_token: impl Into<TokenId>,
        collateral_amount: u128,
    ) -> Result<()> {
        let (debt_token, collateral_token) = (debt_token.into(), collateral_token.into());
        self.atomically("repay_and_withdraw", |tx| {
            tx.exec.repay(&tx.risk, &user, &user, &debt_token, debt_amount)?;
            tx.exec.withdraw(&tx.risk, &user, &collateral_token, collateral_amount)?;
            tx.events.record(ProtocolEvent::Repaid {
                payer: user,
                on_behalf_of: user,
                token: debt_token.clone(),
                amount: debt_amount,
            });
            tx.events.record(ProtocolEvent::CollateralWithdrawn {
                user,
                token: collateral_token.clone(),
                amount: collateral_amount,
            });
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate `user` as the external liquidator `caller`
    pub fn liquidate(
        &mut self,
        caller: Address,
        user: Address,
        collateral_token: impl Into<TokenId>,
        debt_token: impl Into<TokenId>,
        debt_to_cover: u128,
    ) -> Result<LiquidationOutcome> {
        let request = LiquidationRequest::new(user, collateral_token, debt_token, debt_to_cover);
        self.run_liquidation("liquidate", ActingAs::Caller(caller), request)
    }

    /// Liquidate `user` on the protocol's behalf, keeping the seized collateral
    ///
    /// Only the configured admin may trigger this path. The protocol account
    /// repays the debt from custody.
    pub fn protocol_liquidate(
        &mut self,
        admin: Address,
        user: Address,
        collateral_token: impl Into<TokenId>,
        debt_token: impl Into<TokenId>,
        debt_to_cover: u128,
    ) -> Result<LiquidationOutcome> {
        if admin != self.config.admin {
            tracing::warn!(caller = %admin.short(), "protocol liquidation by non-admin");
            return Err(Error::Unauthorized(format!(
                "{} may not trigger protocol liquidations",
                admin
            )));
        }
        let request = LiquidationRequest::new(user, collateral_token, debt_token, debt_to_cover);
        self.run_liquidation("protocol_liquidate", ActingAs::Protocol, request)
    }

    fn run_liquidation(
        &mut self,
        entry: &'static str,
        acting_as: ActingAs,
        request: LiquidationRequest,
    ) -> Result<LiquidationOutcome> {
        self.atomically(entry, |tx| {
            let outcome = tx.liquidations.liquidate(&tx.risk, &mut tx.exec, acting_as, &request)?;
            for draw in &outcome.bonus_draws {
                tx.events.record(ProtocolEvent::BonusDrawn {
                    user: outcome.user,
                    token: draw.token.clone(),
                    amount: draw.amount,
                    usd_value: draw.usd_value,
                });
            }
            tx.events.record(ProtocolEvent::Liquidated {
                user: outcome.user,
                liquidator: outcome.liquidator,
                recipient: outcome.recipient,
                collateral_token: outcome.collateral_token.clone(),
                debt_token: outcome.debt_token.clone(),
                debt_repaid: outcome.debt_repaid,
                collateral_seized: outcome.collateral_seized,
                starting_health_factor: outcome.starting_health_factor,
                ending_health_factor: outcome.ending_health_factor,
            });
            Ok(outcome)
        })
    }

    /// Settlement a liquidation would produce, computed on a scratch copy
    pub fn preview_liquidation(
        &self,
        acting_as: ActingAs,
        request: &LiquidationRequest,
    ) -> Result<LiquidationOutcome> {
        let mut scratch = self.state.clone();
        let risk = self.risk();
        let mut exec = SettlementExecutor::new(
            &mut scratch.ledger,
            &mut scratch.tokens,
            self.config.protocol_address,
        );
        scratch.liquidations.liquidate(&risk, &mut exec, acting_as, request)
    }

    /// Those of `users` that can be liquidated, lowest health factor first
    pub fn find_liquidatable(&self, users: &[Address]) -> Result<Vec<(Address, u128)>> {
        self.state
            .liquidations
            .find_liquidatable(&self.risk(), &self.state.ledger, users)
    }

    /// Liquidation totals
    pub fn liquidation_stats(&self) -> &LiquidationStats {
        self.state.liquidations.statistics()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Health factor of `user`
    pub fn health_factor(&self, user: &Address) -> Result<u128> {
        self.risk().health_factor(&self.state.ledger, user)
    }

    /// USD value of `user`'s collateral
    pub fn collateral_value_usd(&self, user: &Address) -> Result<u128> {
        self.risk().collateral_value_usd(&self.state.ledger, user)
    }

    /// USD value of `user`'s debt
    pub fn debt_value_usd(&self, user: &Address) -> Result<u128> {
        self.risk().debt_value_usd(&self.state.ledger, user)
    }

    /// `(collateral_usd, debt_usd)` of `user`
    pub fn account_information(&self, user: &Address) -> Result<(u128, u128)> {
        self.risk().account_information(&self.state.ledger, user)
    }

    /// Health factor for arbitrary USD totals
    pub fn calculate_health_factor(&self, collateral_usd: u128, debt_usd: u128) -> Result<u128> {
        risk::calculate_health_factor(&self.config.params, collateral_usd, debt_usd)
    }

    /// USD value of `amount` of `token`
    pub fn usd_value(&self, token: &TokenId, amount: u128) -> Result<u128> {
        self.risk().usd_value(token, amount)
    }

    /// Units of `token` worth `usd`
    pub fn token_amount_from_usd(&self, token: &TokenId, usd: u128) -> Result<u128> {
        self.risk().token_amount_from_usd(token, usd)
    }

    /// Units of `token` that can still be borrowed
    pub fn available_to_borrow(&self, token: &TokenId) -> Result<u128> {
        self.registry.ensure_allowed(token)?;
        Ok(available_liquidity(
            &self.state.ledger,
            &self.state.tokens,
            &self.config.protocol_address,
            token,
        ))
    }

    /// Balances, totals and health of `user`
    pub fn position_summary(&self, user: &Address) -> Result<PositionSummary> {
        let ledger = &self.state.ledger;
        let risk = self.risk();
        let (collateral_usd, debt_usd) = risk.account_information(ledger, user)?;
        let health_factor = risk.calculate_health_factor(collateral_usd, debt_usd)?;

        let nonzero = |amount: u128, token: &TokenId| (amount > 0).then(|| (token.clone(), amount));
        Ok(PositionSummary {
            user: *user,
            collateral: self
                .registry
                .tokens()
                .filter_map(|t| nonzero(ledger.collateral_of(user, t), t))
                .collect(),
            debt: self
                .registry
                .tokens()
                .filter_map(|t| nonzero(ledger.debt_of(user, t), t))
                .collect(),
            collateral_usd,
            debt_usd,
            health_factor,
            health_factor_decimal: to_decimal(health_factor),
        })
    }

    /// Check the ledger's global totals against the per-user debts
    pub fn verify_invariants(&self) -> Result<()> {
        self.state.ledger.verify_invariants()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration in use
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Allowed tokens
    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Ledger
    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    /// Token collaborator
    pub fn tokens(&self) -> &T {
        &self.state.tokens
    }

    /// Token collaborator, for funding accounts outside protocol calls
    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.state.tokens
    }

    /// Price oracle
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Price oracle, for feeding prices
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Committed events
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    /// True while a mutating call is in flight
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }
}

impl<O, T> std::fmt::Debug for LendingProtocol<O, T>
where
    O: PriceOracle,
    T: TokenTransfer + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingProtocol")
            .field("protocol", &self.config.protocol_address)
            .field("tokens", &self.registry.len())
            .field("accounts", &self.state.ledger.accounts().count())
            .field("events", &self.state.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::TokenBinding;
    use crate::core::token::InMemoryTokens;
    use crate::oracle::{usd, ManualClock, PriceFeedRegistry};
    use crate::utils::constants::PRECISION;
    use std::sync::Arc;

    const ETHER: u128 = PRECISION;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn protocol() -> LendingProtocol<PriceFeedRegistry, InMemoryTokens> {
        let custody = Address::from_label("protocol");
        let config = ProtocolConfig::new(
            custody,
            Address::from_label("admin"),
            vec![
                TokenBinding::new("WETH", "ETH/USD"),
                TokenBinding::new("USDC", "USDC/USD"),
            ],
        );
        let mut feeds = PriceFeedRegistry::with_clock(Arc::new(ManualClock::new(1)), 3600);
        feeds.set_price("ETH/USD", usd(2000).unwrap());
        feeds.set_price("USDC/USD", usd(1).unwrap());

        let mut tokens = InMemoryTokens::new();
        tokens.mint(&"USDC".into(), &custody, 100_000 * ETHER);
        tokens.mint(&"WETH".into(), &alice(), 10 * ETHER);
        tokens.approve(&"WETH".into(), &alice(), &custody, u128::MAX);
        tokens.approve(&"USDC".into(), &alice(), &custody, u128::MAX);

        LendingProtocol::new(config, feeds, tokens).unwrap()
    }

    #[test]
    fn test_failed_call_restores_state() {
        let mut p = protocol();
        p.deposit_collateral(alice(), "WETH", 5 * ETHER).unwrap();
        let before = p.ledger().clone();
        let events_before = p.events().len();

        p.tokens_mut().set_frozen(&"USDC".into(), true);
        let err = p.borrow(alice(), "USDC", 1_000 * ETHER).unwrap_err();

        assert!(matches!(err, Error::TransferFailed { .. }));
        assert_eq!(p.ledger(), &before);
        assert_eq!(p.events().len(), events_before);
        assert!(!p.is_busy());
    }

    #[test]
    fn test_deposit_and_borrow_is_atomic() {
        let mut p = protocol();
        // Deposit succeeds, the borrow breaks health: nothing sticks
        let err = p
            .deposit_and_borrow(alice(), "WETH", ETHER, "USDC", 1_500 * ETHER)
            .unwrap_err();
        assert!(matches!(err, Error::HealthFactorBroken(_)));
        assert_eq!(p.ledger().collateral_of(&alice(), &"WETH".into()), 0);
        assert_eq!(p.tokens().balance_of(&"WETH".into(), &alice()), 10 * ETHER);
    }

    #[test]
    fn test_position_summary() {
        let mut p = protocol();
        p.deposit_and_borrow(alice(), "WETH", 5 * ETHER, "USDC", 2_000 * ETHER)
            .unwrap();

        let summary = p.position_summary(&alice()).unwrap();
        assert_eq!(summary.collateral, vec![(TokenId::new("WETH"), 5 * ETHER)]);
        assert_eq!(summary.debt, vec![(TokenId::new("USDC"), 2_000 * ETHER)]);
        assert_eq!(summary.health_factor_decimal, Some(Decimal::new(25, 1)));
        assert!(!summary.is_liquidatable(PRECISION));
    }

    #[test]
    fn test_protocol_liquidate_requires_admin() {
        let mut p = protocol();
        let err = p
            .protocol_liquidate(alice(), Address::from_label("bob"), "WETH", "USDC", 1)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_available_to_borrow() {
        let mut p = protocol();
        p.deposit_and_borrow(alice(), "WETH", 5 * ETHER, "USDC", 2_000 * ETHER)
            .unwrap();
        assert_eq!(p.available_to_borrow(&"USDC".into()).unwrap(), 96_000 * ETHER);
        assert_eq!(
            p.available_to_borrow(&"DOGE".into()),
            Err(Error::TokenNotAllowed("DOGE".into()))
        );
    }
}
