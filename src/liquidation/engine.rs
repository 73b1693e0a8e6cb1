//! Liquidation engine.
//!
//! A liquidator repays part of an unhealthy position's debt and receives
//! collateral worth the repaid debt plus a bonus. The bonus is funded first
//! from the chosen collateral's excess over the repaid debt, then from the
//! position's other collateral through the bonus waterfall. When the bonus
//! cannot be funded in full, only the protocol may liquidate and it keeps the
//! seized collateral itself.

use serde::{Deserialize, Serialize};

use crate::core::ledger::{CollateralStore, DebtStore, Ledger};
use crate::core::risk::RiskEngine;
use crate::core::token::{TokenId, TokenTransfer};
use crate::error::{Error, Result};
use crate::liquidation::waterfall::{draw_bonus, total_drawn, BonusDraw};
use crate::oracle::PriceOracle;
use crate::protocol::executor::{Recipient, SettlementExecutor};
use crate::utils::address::Address;
use crate::utils::math::{mul_div, safe_add};
use crate::utils::validation::{validate_address, validate_non_zero};

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST / OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// On whose behalf a liquidation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActingAs {
    /// An external liquidator paying from its own balance
    Caller(Address),
    /// The protocol, paying from custody and keeping what it seizes
    Protocol,
}

/// Liquidation parameters chosen by the liquidator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationRequest {
    /// Position to liquidate
    pub user: Address,
    /// Collateral the liquidator wants to receive
    pub collateral_token: TokenId,
    /// Debt token being repaid
    pub debt_token: TokenId,
    /// Units of debt to repay
    pub debt_to_cover: u128,
}

impl LiquidationRequest {
    /// Build a request
    pub fn new(
        user: Address,
        collateral_token: impl Into<TokenId>,
        debt_token: impl Into<TokenId>,
        debt_to_cover: u128,
    ) -> Self {
        Self {
            user,
            collateral_token: collateral_token.into(),
            debt_token: debt_token.into(),
            debt_to_cover,
        }
    }
}

/// Settlement record of a completed liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Liquidated position
    pub user: Address,
    /// Account that paid the debt
    pub liquidator: Address,
    /// Account that ended up with the seized collateral
    pub recipient: Address,
    /// True if the protocol kept the collateral
    pub kept_by_protocol: bool,
    /// Collateral chosen by the liquidator
    pub collateral_token: TokenId,
    /// Debt token repaid
    pub debt_token: TokenId,
    /// Debt units repaid
    pub debt_repaid: u128,
    /// USD value of the repaid debt
    pub debt_usd: u128,
    /// Full bonus owed, in USD
    pub bonus_needed_usd: u128,
    /// Bonus funded by the chosen collateral, in USD
    pub bonus_from_primary_usd: u128,
    /// Bonus funded by the waterfall, in USD
    pub bonus_from_other_usd: u128,
    /// Units of the chosen collateral seized
    pub collateral_seized: u128,
    /// Waterfall draws, in registry order
    pub bonus_draws: Vec<BonusDraw>,
    /// Health factor before settlement
    pub starting_health_factor: u128,
    /// Health factor after settlement
    pub ending_health_factor: u128,
}

impl LiquidationOutcome {
    /// Total bonus funded, in USD
    pub fn bonus_available_usd(&self) -> u128 {
        self.bonus_from_primary_usd.saturating_add(self.bonus_from_other_usd)
    }

    /// True if the full bonus was funded
    pub fn bonus_fully_funded(&self) -> bool {
        self.bonus_available_usd() >= self.bonus_needed_usd
    }
}

/// Running liquidation totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Liquidations committed
    pub total_liquidations: u64,
    /// Liquidations where the protocol kept the collateral
    pub protocol_liquidations: u64,
    /// USD value of all debt repaid through liquidation
    pub total_debt_usd_covered: u128,
    /// USD value of all bonuses funded
    pub total_bonus_usd: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Liquidation executor and bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEngine {
    stats: LiquidationStats,
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals since creation
    pub fn statistics(&self) -> &LiquidationStats {
        &self.stats
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION DETECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Those of `users` below the minimum health factor, lowest health factor first
    pub fn find_liquidatable<O: PriceOracle + ?Sized>(
        &self,
        risk: &RiskEngine<'_, O>,
        ledger: &Ledger,
        users: &[Address],
    ) -> Result<Vec<(Address, u128)>> {
        let min = risk.params().min_health_factor;
        let mut found = Vec::new();
        for user in users {
            let health_factor = risk.health_factor(ledger, user)?;
            if health_factor < min {
                found.push((*user, health_factor));
            }
        }
        found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(found)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate part of a position
    ///
    /// Collateral is seized before any debt is reduced or repayment pulled.
    /// Any failure leaves the executor's state partially modified; the caller
    /// restores its snapshot.
    pub fn liquidate<O, T>(
        &mut self,
        risk: &RiskEngine<'_, O>,
        exec: &mut SettlementExecutor<'_, T>,
        acting_as: ActingAs,
        request: &LiquidationRequest,
    ) -> Result<LiquidationOutcome>
    where
        O: PriceOracle + ?Sized,
        T: TokenTransfer + ?Sized,
    {
        let LiquidationRequest {
            user,
            collateral_token,
            debt_token,
            debt_to_cover,
        } = request;
        let (user, debt_to_cover) = (*user, *debt_to_cover);
        let custody = *exec.custody();
        let liquidator = match acting_as {
            ActingAs::Caller(caller) => caller,
            ActingAs::Protocol => custody,
        };

        validate_address(&user, "user")?;
        validate_address(&liquidator, "liquidator")?;
        if acting_as == ActingAs::Caller(custody) {
            return Err(Error::Unauthorized(
                "protocol account liquidates only through the protocol path".into(),
            ));
        }
        if user == liquidator {
            return Err(Error::CantLiquidateSelf(user));
        }
        validate_non_zero(debt_to_cover)?;
        risk.registry().ensure_allowed(collateral_token)?;
        risk.registry().ensure_allowed(debt_token)?;

        let borrowed = exec.ledger().debt_of(&user, debt_token);
        if debt_to_cover > borrowed {
            return Err(Error::DebtExceedsBorrowed {
                requested: debt_to_cover,
                borrowed,
            });
        }
        let payer_balance = exec.tokens().balance_of(debt_token, &liquidator);
        if payer_balance < debt_to_cover {
            return Err(Error::InsufficientBalanceToLiquidate {
                required: debt_to_cover,
                available: payer_balance,
            });
        }

        let starting_health_factor = risk.health_factor(exec.ledger(), &user)?;
        if starting_health_factor >= risk.params().min_health_factor {
            return Err(Error::HealthFactorHealthy(starting_health_factor));
        }

        // Bonus sizing
        let params = risk.params();
        let debt_usd = risk.usd_value(debt_token, debt_to_cover)?;
        let bonus_needed_usd = mul_div(debt_usd, params.liquidation_bonus, params.liquidation_precision)?;

        let chosen_balance = exec.ledger().collateral_of(&user, collateral_token);
        let chosen_usd = if chosen_balance > 0 {
            risk.usd_value(collateral_token, chosen_balance)?
        } else {
            0
        };
        let bonus_from_primary_usd = chosen_usd.saturating_sub(debt_usd).min(bonus_needed_usd);

        let bonus_draws = if bonus_from_primary_usd < bonus_needed_usd {
            draw_bonus(
                risk,
                exec,
                &user,
                collateral_token,
                chosen_usd,
                bonus_needed_usd - bonus_from_primary_usd,
            )?
        } else {
            Vec::new()
        };
        let bonus_from_other_usd = total_drawn(&bonus_draws)?;
        let bonus_available_usd = safe_add(bonus_from_primary_usd, bonus_from_other_usd)?;

        let recipient = match acting_as {
            ActingAs::Protocol => Recipient::Protocol,
            ActingAs::Caller(caller) if bonus_available_usd >= bonus_needed_usd => Recipient::Caller(caller),
            ActingAs::Caller(_) => {
                return Err(Error::OnlyProtocolCanLiquidateInsufficientBonus {
                    available: bonus_available_usd,
                    needed: bonus_needed_usd,
                });
            }
        };

        tracing::debug!(
            user = %user.short(),
            debt_usd,
            bonus_needed_usd,
            bonus_from_primary_usd,
            bonus_from_other_usd,
            "liquidation sized"
        );

        // Settlement: collateral out first, debt afterwards
        let collateral_seized = safe_add(
            risk.token_amount_from_usd(collateral_token, debt_usd)?,
            risk.token_amount_from_usd(collateral_token, bonus_from_primary_usd)?,
        )?;
        exec.seize(&user, collateral_token, collateral_seized, recipient)?;
        if let Recipient::Caller(caller) = recipient {
            for draw in &bonus_draws {
                exec.release_from_custody(&draw.token, &caller, draw.amount)?;
            }
        }
        exec.settle_debt(&user, &liquidator, debt_token, debt_to_cover)?;

        let ending_health_factor = risk.health_factor(exec.ledger(), &user)?;
        if ending_health_factor <= starting_health_factor {
            return Err(Error::HealthFactorNotImproved {
                starting: starting_health_factor,
                ending: ending_health_factor,
            });
        }
        if exec.ledger().has_position(&liquidator) {
            risk.assert_healthy(exec.ledger(), &liquidator)?;
        }

        let kept_by_protocol = recipient == Recipient::Protocol;
        self.stats.total_liquidations += 1;
        if kept_by_protocol {
            self.stats.protocol_liquidations += 1;
        }
        self.stats.total_debt_usd_covered = self.stats.total_debt_usd_covered.saturating_add(debt_usd);
        self.stats.total_bonus_usd = self.stats.total_bonus_usd.saturating_add(bonus_available_usd);

        tracing::info!(
            user = %user.short(),
            liquidator = %liquidator.short(),
            collateral = %collateral_token,
            debt = %debt_token,
            debt_to_cover,
            collateral_seized,
            starting_health_factor,
            ending_health_factor,
            kept_by_protocol,
            "position liquidated"
        );

        Ok(LiquidationOutcome {
            user,
            liquidator,
            recipient: match recipient {
                Recipient::Caller(caller) => caller,
                Recipient::Protocol => custody,
            },
            kept_by_protocol,
            collateral_token: collateral_token.clone(),
            debt_token: debt_token.clone(),
            debt_repaid: debt_to_cover,
            debt_usd,
            bonus_needed_usd,
            bonus_from_primary_usd,
            bonus_from_other_usd,
            collateral_seized,
            bonus_draws,
            starting_health_factor,
            ending_health_factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProtocolParams;
    use crate::core::registry::{TokenBinding, TokenRegistry};
    use crate::core::token::InMemoryTokens;
    use crate::oracle::{usd, ManualClock, PriceFeedRegistry};
    use crate::utils::constants::PRECISION;
    use std::sync::Arc;

    const ETHER: u128 = PRECISION;

    struct Fixture {
        registry: TokenRegistry,
        feeds: PriceFeedRegistry,
        params: ProtocolParams,
        ledger: Ledger,
        tokens: InMemoryTokens,
        custody: Address,
        user: Address,
        liquidator: Address,
    }

    fn weth() -> TokenId {
        TokenId::new("WETH")
    }

    fn wbtc() -> TokenId {
        TokenId::new("WBTC")
    }

    fn usdc() -> TokenId {
        TokenId::new("USDC")
    }

    /// Position with `weth` WETH and `wbtc` WBTC as collateral and `debt` USDC
    /// of debt, already reflected in custody balances.
    fn fixture(weth_amount: u128, wbtc_amount: u128, debt: u128) -> Fixture {
        let mut feeds = PriceFeedRegistry::with_clock(Arc::new(ManualClock::new(1)), 3600);
        feeds.set_price("ETH/USD", usd(2000).unwrap());
        feeds.set_price("BTC/USD", usd(20_000).unwrap());
        feeds.set_price("USDC/USD", usd(1).unwrap());

        let custody = Address::from_label("protocol");
        let user = Address::from_label("user");
        let liquidator = Address::from_label("liquidator");

        let mut ledger = Ledger::new();
        let mut tokens = InMemoryTokens::new();
        if weth_amount > 0 {
            ledger.increase_collateral(&user, &weth(), weth_amount).unwrap();
            tokens.mint(&weth(), &custody, weth_amount);
        }
        if wbtc_amount > 0 {
            ledger.increase_collateral(&user, &wbtc(), wbtc_amount).unwrap();
            tokens.mint(&wbtc(), &custody, wbtc_amount);
        }
        ledger.increase_debt(&user, &usdc(), debt).unwrap();
        tokens.mint(&usdc(), &custody, 100_000 * ETHER);
        tokens.mint(&usdc(), &liquidator, 10_000 * ETHER);
        tokens.approve(&usdc(), &liquidator, &custody, u128::MAX);

        Fixture {
            registry: TokenRegistry::new(vec![
                TokenBinding::new("WETH", "ETH/USD"),
                TokenBinding::new("WBTC", "BTC/USD"),
                TokenBinding::new("USDC", "USDC/USD"),
            ])
            .unwrap(),
            feeds,
            params: ProtocolParams::default(),
            ledger,
            tokens,
            custody,
            user,
            liquidator,
        }
    }

    fn run(f: &mut Fixture, acting_as: ActingAs, collateral: TokenId, amount: u128) -> Result<LiquidationOutcome> {
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        let mut exec = SettlementExecutor::new(&mut f.ledger, &mut f.tokens, f.custody);
        let request = LiquidationRequest::new(f.user, collateral, usdc(), amount);
        LiquidationEngine::new().liquidate(&risk, &mut exec, acting_as, &request)
    }

    #[test]
    fn test_primary_funds_full_bonus() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        f.feeds.set_price("ETH/USD", usd(500).unwrap());

        let liquidator = f.liquidator;
        let outcome = run(&mut f, ActingAs::Caller(liquidator), weth(), 1_000 * ETHER).unwrap();

        assert_eq!(outcome.bonus_needed_usd, 100 * PRECISION);
        assert_eq!(outcome.bonus_from_primary_usd, 100 * PRECISION);
        assert_eq!(outcome.collateral_seized, 2_200_000_000_000_000_000);
        assert_eq!(outcome.starting_health_factor, 625_000_000_000_000_000);
        assert_eq!(outcome.ending_health_factor, 700_000_000_000_000_000);
        assert_eq!(f.tokens.balance_of(&weth(), &liquidator), 2_200_000_000_000_000_000);
        assert_eq!(f.ledger.debt_of(&f.user, &usdc()), 1_000 * ETHER);
    }

    #[test]
    fn test_waterfall_completes_bonus() {
        // $2000 WETH + $1000 WBTC against $1400 of debt
        let mut f = fixture(ETHER, ETHER / 20, 1_400 * ETHER);
        f.feeds.set_price("ETH/USD", usd(1000).unwrap());

        let liquidator = f.liquidator;
        let outcome = run(&mut f, ActingAs::Caller(liquidator), weth(), 1_000 * ETHER).unwrap();

        assert_eq!(outcome.bonus_from_primary_usd, 0);
        assert_eq!(outcome.bonus_from_other_usd, 100 * PRECISION);
        assert_eq!(outcome.collateral_seized, ETHER);
        assert_eq!(f.tokens.balance_of(&weth(), &liquidator), ETHER);
        assert_eq!(f.tokens.balance_of(&wbtc(), &liquidator), 5_000_000_000_000_000);
        assert_eq!(f.ledger.collateral_of(&f.custody, &wbtc()), 0);
        assert_eq!(outcome.ending_health_factor, 1_125_000_000_000_000_000);
    }

    #[test]
    fn test_insufficient_bonus_blocks_external_caller() {
        let mut f = fixture(ETHER, 0, 900 * ETHER);
        f.feeds.set_price("ETH/USD", usd(945).unwrap());

        let liquidator = f.liquidator;
        let err = run(&mut f, ActingAs::Caller(liquidator), weth(), 900 * ETHER).unwrap_err();
        assert_eq!(
            err,
            Error::OnlyProtocolCanLiquidateInsufficientBonus {
                available: 45 * PRECISION,
                needed: 90 * PRECISION,
            }
        );
    }

    #[test]
    fn test_protocol_keeps_collateral() {
        let mut f = fixture(ETHER, 0, 900 * ETHER);
        f.feeds.set_price("ETH/USD", usd(945).unwrap());

        let outcome = run(&mut f, ActingAs::Protocol, weth(), 900 * ETHER).unwrap();
        assert!(outcome.kept_by_protocol);
        assert_eq!(outcome.recipient, f.custody);
        assert_eq!(outcome.ending_health_factor, u128::MAX);
        assert_eq!(f.ledger.collateral_of(&f.custody, &weth()), outcome.collateral_seized);
        assert_eq!(f.ledger.total_borrowed(&usdc()), 0);
    }

    #[test]
    fn test_healthy_position_rejected() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        let liquidator = f.liquidator;
        assert_eq!(
            run(&mut f, ActingAs::Caller(liquidator), weth(), 100 * ETHER),
            Err(Error::HealthFactorHealthy(2_500_000_000_000_000_000))
        );
    }

    #[test]
    fn test_cannot_liquidate_self() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        let user = f.user;
        assert_eq!(
            run(&mut f, ActingAs::Caller(user), weth(), 100 * ETHER),
            Err(Error::CantLiquidateSelf(user))
        );
    }

    #[test]
    fn test_protocol_account_cannot_act_as_caller() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        f.feeds.set_price("ETH/USD", usd(500).unwrap());
        let custody = f.custody;
        let ledger_before = f.ledger.clone();

        let err = run(&mut f, ActingAs::Caller(custody), weth(), 1_000 * ETHER).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert_eq!(f.ledger, ledger_before);
        assert_eq!(f.tokens.balance_of(&weth(), &custody), 5 * ETHER);
    }

    #[test]
    fn test_cover_more_than_borrowed() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        let liquidator = f.liquidator;
        assert_eq!(
            run(&mut f, ActingAs::Caller(liquidator), weth(), 2_001 * ETHER),
            Err(Error::DebtExceedsBorrowed {
                requested: 2_001 * ETHER,
                borrowed: 2_000 * ETHER,
            })
        );
    }

    #[test]
    fn test_liquidator_balance_checked() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        f.feeds.set_price("ETH/USD", usd(500).unwrap());
        let poor = Address::from_label("poor");
        assert_eq!(
            run(&mut f, ActingAs::Caller(poor), weth(), 1_000 * ETHER),
            Err(Error::InsufficientBalanceToLiquidate {
                required: 1_000 * ETHER,
                available: 0,
            })
        );
    }

    #[test]
    fn test_find_liquidatable_orders_by_health() {
        let mut f = fixture(5 * ETHER, 0, 2_000 * ETHER);
        let other = Address::from_label("other");
        f.ledger.increase_collateral(&other, &weth(), 5 * ETHER).unwrap();
        f.ledger.increase_debt(&other, &usdc(), 2_400 * ETHER).unwrap();
        f.feeds.set_price("ETH/USD", usd(500).unwrap());

        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        let healthy = Address::from_label("healthy");
        let found = LiquidationEngine::new()
            .find_liquidatable(&risk, &f.ledger, &[f.user, other, healthy])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, other);
        assert!(found[0].1 < found[1].1);
    }
}
