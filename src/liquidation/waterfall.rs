//! Bonus waterfall.
//!
//! When the chosen collateral cannot fund the whole liquidation bonus, the
//! shortfall is drawn from the position's other collateral tokens, each
//! contributing in proportion to its share of the other collateral's USD value.
//! Tokens are visited in registry order; the last token with a balance absorbs
//! the integer rounding residue. A draw never exceeds the token balance: when
//! the proportional amount would, the whole balance is taken and its USD value
//! recomputed from the capped amount.

use serde::{Deserialize, Serialize};

use crate::core::ledger::CollateralStore;
use crate::core::risk::RiskEngine;
use crate::core::token::{TokenId, TokenTransfer};
use crate::error::Result;
use crate::oracle::PriceOracle;
use crate::protocol::executor::SettlementExecutor;
use crate::utils::address::Address;
use crate::utils::math::{mul_div, safe_add};

/// Collateral drawn from one non-chosen token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusDraw {
    /// Token drawn
    pub token: TokenId,
    /// Units moved into protocol custody
    pub amount: u128,
    /// USD value credited toward the bonus
    pub usd_value: u128,
}

/// Draw up to `remaining_usd` of bonus from `user`'s collateral other than
/// `chosen`, moving each draw into protocol custody
///
/// `chosen_usd` is the USD value of the chosen collateral balance.
pub fn draw_bonus<O, T>(
    risk: &RiskEngine<'_, O>,
    exec: &mut SettlementExecutor<'_, T>,
    user: &Address,
    chosen: &TokenId,
    chosen_usd: u128,
    remaining_usd: u128,
) -> Result<Vec<BonusDraw>>
where
    O: PriceOracle + ?Sized,
    T: TokenTransfer + ?Sized,
{
    if remaining_usd == 0 {
        return Ok(Vec::new());
    }

    let total_usd = risk.collateral_value_usd(exec.ledger(), user)?;
    let other_usd = total_usd.saturating_sub(chosen_usd);
    if other_usd == 0 {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    for token in risk.registry().tokens().filter(|t| *t != chosen) {
        let balance = exec.ledger().collateral_of(user, token);
        if balance > 0 {
            let token_usd = risk.usd_value(token, balance)?;
            candidates.push((token.clone(), balance, token_usd));
        }
    }

    let last = candidates.len().saturating_sub(1);
    let mut drawn_usd = 0u128;
    let mut draws = Vec::with_capacity(candidates.len());

    for (i, (token, balance, token_usd)) in candidates.into_iter().enumerate() {
        let mut share_usd = if i == last {
            remaining_usd.saturating_sub(drawn_usd)
        } else {
            mul_div(remaining_usd, token_usd, other_usd)?
        };

        let mut amount = risk.token_amount_from_usd(&token, share_usd)?;
        if amount > balance {
            amount = balance;
            share_usd = token_usd;
        }
        if amount == 0 {
            continue;
        }

        exec.move_to_custody(user, &token, amount)?;
        drawn_usd = safe_add(drawn_usd, share_usd)?;

        tracing::debug!(
            user = %user.short(),
            token = %token,
            amount,
            usd_value = share_usd,
            "bonus drawn from secondary collateral"
        );
        draws.push(BonusDraw {
            token,
            amount,
            usd_value: share_usd,
        });
    }

    Ok(draws)
}

/// Total USD credited by a set of draws
pub fn total_drawn(draws: &[BonusDraw]) -> Result<u128> {
    draws.iter().try_fold(0u128, |acc, d| safe_add(acc, d.usd_value))
}
