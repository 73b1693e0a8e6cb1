//! Risk engine: USD valuation and the health factor.
//!
//! Every value is an integer scaled by `precision` (1e18). Oracle prices carry
//! 8 decimals and are bridged with `additional_feed_precision` (1e10):
//!
//! ```text
//! usd(token, amount)   = price * 1e10 * amount / 1e18
//! amount(token, usd)   = usd * 1e18 / (price * 1e10)
//! health_factor(user)  = (collateral_usd * threshold / liq_precision) * 1e18 / debt_usd
//! ```
//!
//! A position without debt has the [`MAX_HEALTH_FACTOR`] sentinel. USD to
//! token conversions truncate toward zero.

use crate::core::config::ProtocolParams;
use crate::core::ledger::{CollateralStore, DebtStore};
use crate::core::registry::TokenRegistry;
use crate::core::token::TokenId;
use crate::error::{Error, Result};
use crate::oracle::PriceOracle;
use crate::utils::address::Address;
use crate::utils::constants::MAX_HEALTH_FACTOR;
use crate::utils::math::{mul_div, safe_add};

/// Health factor for the given USD totals
///
/// A quotient too large for `u128` saturates at [`MAX_HEALTH_FACTOR`]; any
/// other arithmetic failure is returned.
pub fn calculate_health_factor(params: &ProtocolParams, collateral_usd: u128, debt_usd: u128) -> Result<u128> {
    if debt_usd == 0 {
        return Ok(MAX_HEALTH_FACTOR);
    }
    let adjusted = mul_div(
        collateral_usd,
        params.liquidation_threshold,
        params.liquidation_precision,
    )?;
    match mul_div(adjusted, params.precision, debt_usd) {
        Err(Error::Overflow { .. }) => Ok(MAX_HEALTH_FACTOR),
        other => other,
    }
}

/// Read-only solvency view over a ledger
pub struct RiskEngine<'a, O: PriceOracle + ?Sized> {
    registry: &'a TokenRegistry,
    oracle: &'a O,
    params: &'a ProtocolParams,
}

impl<'a, O: PriceOracle + ?Sized> RiskEngine<'a, O> {
    /// Create a risk engine
    pub fn new(registry: &'a TokenRegistry, oracle: &'a O, params: &'a ProtocolParams) -> Self {
        Self {
            registry,
            oracle,
            params,
        }
    }

    /// Parameters in use
    pub fn params(&self) -> &ProtocolParams {
        self.params
    }

    /// Token registry in use
    pub fn registry(&self) -> &TokenRegistry {
        self.registry
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fresh price of `token` scaled to protocol precision
    fn scaled_price(&self, token: &TokenId) -> Result<u128> {
        let feed = self.registry.feed_for(token)?;
        let quote = self.oracle.query(feed)?;
        if quote.is_stale {
            return Err(Error::StalePrice(feed.clone()));
        }
        if quote.price == 0 {
            return Err(Error::InvalidPrice(feed.clone()));
        }
        quote
            .price
            .checked_mul(self.params.additional_feed_precision)
            .ok_or_else(|| Error::Overflow {
                operation: format!("scale price of {}", token),
            })
    }

    /// USD value of `amount` of `token`
    pub fn usd_value(&self, token: &TokenId, amount: u128) -> Result<u128> {
        let price = self.scaled_price(token)?;
        mul_div(amount, price, self.params.precision)
    }

    /// Units of `token` worth `usd`, truncated toward zero
    pub fn token_amount_from_usd(&self, token: &TokenId, usd: u128) -> Result<u128> {
        let price = self.scaled_price(token)?;
        mul_div(usd, self.params.precision, price)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION VALUATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Sum over allowed tokens of the USD value of `user`'s collateral
    ///
    /// Tokens with a zero balance are skipped and never hit the oracle.
    pub fn collateral_value_usd<L>(&self, ledger: &L, user: &Address) -> Result<u128>
    where
        L: CollateralStore + ?Sized,
    {
        let mut total = 0u128;
        for token in self.registry.tokens() {
            let balance = ledger.collateral_of(user, token);
            if balance > 0 {
                total = safe_add(total, self.usd_value(token, balance)?)?;
            }
        }
        Ok(total)
    }

    /// Sum over allowed tokens of the USD value of `user`'s debt
    pub fn debt_value_usd<L>(&self, ledger: &L, user: &Address) -> Result<u128>
    where
        L: DebtStore + ?Sized,
    {
        let mut total = 0u128;
        for token in self.registry.tokens() {
            let balance = ledger.debt_of(user, token);
            if balance > 0 {
                total = safe_add(total, self.usd_value(token, balance)?)?;
            }
        }
        Ok(total)
    }

    /// `(collateral_usd, debt_usd)` of `user`
    pub fn account_information<L>(&self, ledger: &L, user: &Address) -> Result<(u128, u128)>
    where
        L: CollateralStore + DebtStore + ?Sized,
    {
        Ok((
            self.collateral_value_usd(ledger, user)?,
            self.debt_value_usd(ledger, user)?,
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HEALTH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Health factor for the given USD totals
    pub fn calculate_health_factor(&self, collateral_usd: u128, debt_usd: u128) -> Result<u128> {
        calculate_health_factor(self.params, collateral_usd, debt_usd)
    }

    /// Current health factor of `user`
    pub fn health_factor<L>(&self, ledger: &L, user: &Address) -> Result<u128>
    where
        L: CollateralStore + DebtStore + ?Sized,
    {
        let debt_usd = self.debt_value_usd(ledger, user)?;
        if debt_usd == 0 {
            return Ok(MAX_HEALTH_FACTOR);
        }
        let collateral_usd = self.collateral_value_usd(ledger, user)?;
        self.calculate_health_factor(collateral_usd, debt_usd)
    }

    /// Fail with `HealthFactorBroken` if `user` is below the minimum
    pub fn assert_healthy<L>(&self, ledger: &L, user: &Address) -> Result<()>
    where
        L: CollateralStore + DebtStore + ?Sized,
    {
        let health_factor = self.health_factor(ledger, user)?;
        if health_factor < self.params.min_health_factor {
            tracing::debug!(user = %user.short(), health_factor, "health factor broken");
            return Err(Error::HealthFactorBroken(health_factor));
        }
        Ok(())
    }

    /// True if `user` is below the minimum health factor
    pub fn is_liquidatable<L>(&self, ledger: &L, user: &Address) -> Result<bool>
    where
        L: CollateralStore + DebtStore + ?Sized,
    {
        Ok(self.health_factor(ledger, user)? < self.params.min_health_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::Ledger;
    use crate::core::registry::TokenBinding;
    use crate::oracle::{usd, ManualClock, PriceFeedRegistry};
    use crate::utils::constants::PRECISION;
    use std::sync::Arc;

    const ETHER: u128 = PRECISION;

    struct Fixture {
        registry: TokenRegistry,
        feeds: PriceFeedRegistry,
        params: ProtocolParams,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(10_000);
        let mut feeds = PriceFeedRegistry::with_clock(Arc::new(clock.clone()), 3600);
        feeds.set_price("ETH/USD", usd(2000).unwrap());
        feeds.set_price("USDC/USD", usd(1).unwrap());
        Fixture {
            registry: TokenRegistry::new(vec![
                TokenBinding::new("WETH", "ETH/USD"),
                TokenBinding::new("USDC", "USDC/USD"),
            ])
            .unwrap(),
            feeds,
            params: ProtocolParams::default(),
            clock,
        }
    }

    #[test]
    fn test_usd_value_and_inverse() {
        let f = fixture();
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);

        assert_eq!(risk.usd_value(&"WETH".into(), 5 * ETHER).unwrap(), 10_000 * PRECISION);
        assert_eq!(
            risk.token_amount_from_usd(&"WETH".into(), 1_100 * PRECISION).unwrap(),
            550_000_000_000_000_000
        );
    }

    #[test]
    fn test_inverse_truncates() {
        let f = fixture();
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        // $1 / $2000 = 0.0005 WETH; 1 wei of USD is far below one token unit
        assert_eq!(risk.token_amount_from_usd(&"WETH".into(), 1).unwrap(), 0);
    }

    #[test]
    fn test_health_factor_scenario_a() {
        let f = fixture();
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        let alice = Address::from_label("alice");

        let mut ledger = Ledger::new();
        ledger.increase_collateral(&alice, &"WETH".into(), 5 * ETHER).unwrap();
        ledger.increase_debt(&alice, &"USDC".into(), 2_000 * ETHER).unwrap();

        assert_eq!(
            risk.account_information(&ledger, &alice).unwrap(),
            (10_000 * PRECISION, 2_000 * PRECISION)
        );
        assert_eq!(risk.health_factor(&ledger, &alice).unwrap(), 2_500_000_000_000_000_000);
        assert!(risk.assert_healthy(&ledger, &alice).is_ok());
    }

    #[test]
    fn test_health_factor_without_debt_is_max() {
        let f = fixture();
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        let alice = Address::from_label("alice");

        let mut ledger = Ledger::new();
        ledger.increase_collateral(&alice, &"WETH".into(), ETHER).unwrap();
        assert_eq!(risk.health_factor(&ledger, &alice).unwrap(), MAX_HEALTH_FACTOR);
    }

    #[test]
    fn test_uses_threshold_not_bonus() {
        let params = ProtocolParams::default();
        // 10000 * 50/100 / 2000, not 10000 * 10/100 / 2000
        assert_eq!(
            calculate_health_factor(&params, 10_000 * PRECISION, 2_000 * PRECISION),
            Ok(2_500_000_000_000_000_000)
        );
    }

    #[test]
    fn test_health_factor_saturates_on_dust_debt() {
        let params = ProtocolParams::default();
        assert_eq!(calculate_health_factor(&params, u128::MAX / 2, 1), Ok(MAX_HEALTH_FACTOR));
        assert_eq!(calculate_health_factor(&params, 0, 1), Ok(0));
    }

    #[test]
    fn test_health_factor_reports_invalid_params() {
        let params = ProtocolParams {
            liquidation_precision: 0,
            ..ProtocolParams::default()
        };
        assert!(matches!(
            calculate_health_factor(&params, 10_000 * PRECISION, 2_000 * PRECISION),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_assert_healthy_reports_value() {
        let f = fixture();
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        let alice = Address::from_label("alice");

        let mut ledger = Ledger::new();
        ledger.increase_collateral(&alice, &"WETH".into(), ETHER).unwrap();
        ledger.increase_debt(&alice, &"USDC".into(), 1_600 * ETHER).unwrap();

        // 2000 * 0.5 / 1600 = 0.625
        assert_eq!(
            risk.assert_healthy(&ledger, &alice),
            Err(Error::HealthFactorBroken(625_000_000_000_000_000))
        );
        assert!(risk.is_liquidatable(&ledger, &alice).unwrap());
    }

    #[test]
    fn test_stale_price_rejected() {
        let f = fixture();
        f.clock.advance(3601);
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        assert_eq!(
            risk.usd_value(&"WETH".into(), ETHER),
            Err(Error::StalePrice("ETH/USD".into()))
        );
    }

    #[test]
    fn test_disallowed_token() {
        let f = fixture();
        let risk = RiskEngine::new(&f.registry, &f.feeds, &f.params);
        assert_eq!(
            risk.usd_value(&"DOGE".into(), 1),
            Err(Error::TokenNotAllowed("DOGE".into()))
        );
    }
}
