//! Retry backoff policy
//!
//! The single retry policy of the crate. The transaction manager consults it
//! between attempts after a conflict or deadlock; no other component sleeps
//! and retries on its own.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay grows between consecutive retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay multiplied by `backoff_multiplier` after each retry.
    Exponential,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    pub backoff: Backoff,
    /// Multiplier applied to the delay after each retry (exponential only).
    pub backoff_multiplier: f64,
    /// Maximum delay between retries (cap).
    pub max_delay: Duration,
    /// Add up to 25% random jitter so colliding transactions spread out.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            backoff: Backoff::Exponential,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based). `divisor` shortens the
    /// delay for work that should win the next round.
    pub fn delay_for(&self, retry: u32, divisor: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let base = match self.backoff {
            Backoff::Fixed => self.initial_delay.as_secs_f64(),
            Backoff::Exponential => {
                self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent)
            }
        };

        // A non-finite growth factor saturates at the cap.
        let base = if base.is_finite() { base.max(0.0) } else { self.max_delay.as_secs_f64() };
        let mut delay = base.min(self.max_delay.as_secs_f64()) / f64::from(divisor.max(1));

        if self.jitter && delay > 0.0 {
            let spread = delay / 4.0;
            delay += rand::thread_rng().gen_range(0.0..=spread);
        }

        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

// ── Tests ──────────────────────────────────────────────────────
