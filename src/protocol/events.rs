//! Protocol events for state change notifications.
//!
//! Every committed operation records an event. Events of a call that fails
//! are discarded together with the rest of its state changes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::token::TokenId;
use crate::utils::address::Address;
use crate::utils::constants::MAX_EVENT_LOG;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// Collateral was deposited
    CollateralDeposited {
        /// Depositor
        user: Address,
        /// Token deposited
        token: TokenId,
        /// Amount deposited
        amount: u128,
    },
    /// Collateral was withdrawn by its owner
    CollateralWithdrawn {
        /// Owner, also the receiver
        user: Address,
        /// Token withdrawn
        token: TokenId,
        /// Amount withdrawn
        amount: u128,
    },
    /// Tokens were borrowed
    Borrowed {
        /// Borrower
        user: Address,
        /// Token borrowed
        token: TokenId,
        /// Amount borrowed
        amount: u128,
    },
    /// Debt was repaid
    Repaid {
        /// Account that paid
        payer: Address,
        /// Debtor whose debt shrank
        on_behalf_of: Address,
        /// Token repaid
        token: TokenId,
        /// Amount repaid
        amount: u128,
    },
    /// Bonus collateral drawn from a non-chosen collateral token
    BonusDrawn {
        /// Liquidated position
        user: Address,
        /// Token drawn
        token: TokenId,
        /// Units drawn
        amount: u128,
        /// USD value credited to the bonus
        usd_value: u128,
    },
    /// A position was liquidated
    Liquidated {
        /// Liquidated position
        user: Address,
        /// Account that paid the debt
        liquidator: Address,
        /// Account that received the seized collateral
        recipient: Address,
        /// Collateral chosen by the liquidator
        collateral_token: TokenId,
        /// Debt token repaid
        debt_token: TokenId,
        /// Debt units repaid
        debt_repaid: u128,
        /// Units of the chosen collateral seized
        collateral_seized: u128,
        /// Health factor before settlement
        starting_health_factor: u128,
        /// Health factor after settlement
        ending_health_factor: u128,
    },
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CollateralDeposited { .. } => "CollateralDeposited",
            Self::CollateralWithdrawn { .. } => "CollateralWithdrawn",
            Self::Borrowed { .. } => "Borrowed",
            Self::Repaid { .. } => "Repaid",
            Self::BonusDrawn { .. } => "BonusDrawn",
            Self::Liquidated { .. } => "Liquidated",
        }
    }

    /// Position the event is about
    pub fn subject(&self) -> &Address {
        match self {
            Self::CollateralDeposited { user, .. }
            | Self::Borrowed { user, .. }
            | Self::CollateralWithdrawn { user, .. }
            | Self::BonusDrawn { user, .. }
            | Self::Liquidated { user, .. } => user,
            Self::Repaid { on_behalf_of, .. } => on_behalf_of,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded in-memory event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    events: VecDeque<ProtocolEvent>,
    max_events: usize,
    total_recorded: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(MAX_EVENT_LOG)
    }
}

impl EventLog {
    /// Log keeping at most `max_events`
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events,
            total_recorded: 0,
        }
    }

    /// Append an event, pruning the oldest beyond capacity
    pub fn record(&mut self, event: ProtocolEvent) {
        tracing::debug!(event = event.event_type(), subject = %event.subject().short(), "event");
        self.events.push_back(event);
        self.total_recorded += 1;
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Events still retained, oldest first
    pub fn events(&self) -> impl Iterator<Item = &ProtocolEvent> {
        self.events.iter()
    }

    /// Retained events about `user`
    pub fn events_for(&self, user: &Address) -> Vec<&ProtocolEvent> {
        self.events.iter().filter(|e| e.subject() == user).collect()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if no event is retained
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded since creation, including pruned ones
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }
}
