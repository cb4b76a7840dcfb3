//! Global connection budget.
//!
//! One counter shared by every protocol server. Admission is a guarded
//! test-and-increment: a refused increment leaves the counter unchanged and
//! the protocol answers "too many connections". Release saturates at zero
//! and runs on every exit path through the RAII guard.

use std::sync::{Arc, Mutex};

use ranger_core::{codes, RangerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub active: usize,
    pub max: usize,
    pub available: usize,
}

/// `0 <= active <= max`, maintained under the guard lock. Cheap to clone;
/// clones share the counter.
#[derive(Clone, Debug)]
pub struct ConnectionBudget {
    inner: Arc<BudgetInner>,
}

#[derive(Debug)]
struct BudgetInner {
    max: usize,
    active: Mutex<usize>,
}

impl ConnectionBudget {
    pub fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(BudgetInner {
                max,
                active: Mutex::new(0),
            }),
        }
    }

    /// Atomically test-and-increment. Refusal leaves the counter unchanged.
    pub fn try_acquire(&self) -> Result<ConnectionGuard> {
        let mut active = self.inner.active.lock().unwrap_or_else(|p| p.into_inner());
        if *active >= self.inner.max {
            return Err(RangerError::new(
                codes::GATEWAY_TOO_MANY_CONNECTIONS,
                "too many connections",
            )
            .with_context("max_connections", self.inner.max));
        }
        *active += 1;
        Ok(ConnectionGuard {
            budget: self.clone(),
        })
    }

    /// Decrement, saturating at zero.
    fn release(&self) {
        let mut active = self.inner.active.lock().unwrap_or_else(|p| p.into_inner());
        *active = active.saturating_sub(1);
    }

    pub fn active(&self) -> usize {
        *self.inner.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stats(&self) -> ConnectionStats {
        let active = self.active();
        ConnectionStats {
            active,
            max: self.inner.max,
            available: self.inner.max.saturating_sub(active),
        }
    }
}

/// Releases one connection slot on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    budget: ConnectionBudget,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.budget.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_cap() {
        let budget = ConnectionBudget::new(2);
        let first = budget.try_acquire().unwrap();
        let second = budget.try_acquire().unwrap();
        assert_eq!(budget.active(), 2);

        let refused = budget.try_acquire().unwrap_err();
        assert_eq!(
            refused.code().as_str(),
            codes::GATEWAY_TOO_MANY_CONNECTIONS
        );
        assert_eq!(budget.active(), 2);

        drop(first);
        let third = budget.try_acquire().unwrap();
        assert_eq!(budget.active(), 2);

        drop(second);
        drop(third);
        assert_eq!(budget.active(), 0);
    }

    #[test]
    fn test_stats() {
        let budget = ConnectionBudget::new(3);
        let _guard = budget.try_acquire().unwrap();
        assert_eq!(
            budget.stats(),
            ConnectionStats {
                active: 1,
                max: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let budget = ConnectionBudget::new(1);
        let b = budget.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = b.try_acquire().unwrap();
            panic!("handler exploded");
        });
        assert!(result.is_err());
        assert_eq!(budget.active(), 0);
    }
}
