//! Reentrancy guard.
//!
//! A mutating entry point acquires the guard on entry and holds the returned
//! [`GuardScope`] for the rest of the call. The scope releases the guard when
//! dropped, so early returns and `?` propagation release it too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Busy marker shared by every mutating entry point of one protocol instance
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Create an idle guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the protocol busy; fails if a call is already in flight
    pub fn enter(&self, entry: &'static str) -> Result<GuardScope> {
        if self.busy.swap(true, Ordering::AcqRel) {
            tracing::warn!(entry, "reentrant call rejected");
            return Err(Error::Reentrancy(entry));
        }
        Ok(GuardScope {
            busy: Arc::clone(&self.busy),
        })
    }

    /// True while a call holds the guard
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the guard is held; releases it on drop
#[derive(Debug)]
#[must_use = "the guard is released as soon as the scope is dropped"]
pub struct GuardScope {
    busy: Arc<AtomicBool>,
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
