//! Recovery strategies and the retry manager.
//!
//! A strategy decides whether it can handle a given error, how many
//! attempts to make, and the delay before each attempt:
//! `min(max_delay, initial_delay * backoff_factor^(n-1))`, optionally with
//! ±10% jitter. Only errors carrying an automatic recovery action are
//! retried.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codes;
use crate::error::RangerError;
use crate::Result;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff schedule shared by the built-in strategies.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt `n` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let final_secs = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.9..=1.1);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(final_secs.max(0.0))
    }
}

/// Per-component recovery policy.
pub trait RecoveryStrategy: Send + Sync {
    /// Component this strategy covers (`storage`, `registry`, …).
    fn component(&self) -> &'static str;

    /// Whether the strategy applies to this error.
    fn can_handle(&self, err: &RangerError) -> bool;

    fn max_attempts(&self) -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    fn backoff(&self) -> &BackoffPolicy;
}

macro_rules! package_strategy {
    ($name:ident, $tag:literal, $($package:literal)|+) => {
        pub struct $name {
            backoff: BackoffPolicy,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    backoff: BackoffPolicy::default(),
                }
            }

            pub fn with_backoff(backoff: BackoffPolicy) -> Self {
                Self { backoff }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl RecoveryStrategy for $name {
            fn component(&self) -> &'static str {
                $tag
            }

            fn can_handle(&self, err: &RangerError) -> bool {
                matches!(err.code().package(), $($package)|+)
            }

            fn backoff(&self) -> &BackoffPolicy {
                &self.backoff
            }
        }
    };
}

package_strategy!(StorageRecovery, "storage", "storage" | "create_table");
package_strategy!(RegistryRecovery, "registry", "registry");
package_strategy!(EventBusRecovery, "event_bus", "events");
package_strategy!(CacheRecovery, "cache", "cache");

/// Executes recoverable operations with per-component retry policies.
pub struct RecoveryManager {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl RecoveryManager {
    /// Manager with the built-in storage/registry/event-bus/cache strategies.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(StorageRecovery::new()),
                Box::new(RegistryRecovery::new()),
                Box::new(EventBusRecovery::new()),
                Box::new(CacheRecovery::new()),
            ],
        }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        Self { strategies }
    }

    fn strategy_for(&self, err: &RangerError) -> Option<&dyn RecoveryStrategy> {
        self.strategies
            .iter()
            .map(|s| s.as_ref())
            .find(|s| s.can_handle(err))
    }

    /// Run `op`, retrying on automatic-recoverable errors.
    ///
    /// Returns the first success, or the last error with
    /// `retries_exhausted` appended to its context once attempts run out.
    /// Non-recoverable errors and errors no strategy handles are returned
    /// unchanged after the first attempt.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_recoverable() {
                        return Err(err);
                    }
                    let Some(strategy) = self.strategy_for(&err) else {
                        return Err(err);
                    };
                    if attempt >= strategy.max_attempts() {
                        warn!(
                            component = strategy.component(),
                            code = err.code().as_str(),
                            attempts = attempt,
                            "recovery attempts exhausted"
                        );
                        return Err(err.with_context("retries_exhausted", true));
                    }
                    let delay = strategy.backoff().delay(attempt);
                    debug!(
                        component = strategy.component(),
                        code = err.code().as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying recoverable error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
