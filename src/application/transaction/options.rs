//! Per-call transaction options

use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::{BeginOptions, IsolationLevel, TransactionPriority};
use crate::shared::utills::RetryPolicy;

/// Knobs for one `TransactionManager::execute` call.
///
/// ```ignore
/// let options = manager
///     .options()
///     .with_priority(TransactionPriority::High)
///     .with_metadata("operation", "check_in");
/// ```
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// How long `begin` may wait for the store.
    pub max_wait: Duration,
    /// Overall deadline for the call, retries and backoff included.
    pub timeout: Duration,
    pub isolation: IsolationLevel,
    pub priority: TransactionPriority,
    pub enable_retry: bool,
    pub retry: RetryPolicy,
    /// Free-form tags copied onto the transaction context.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            isolation: IsolationLevel::ReadCommitted,
            priority: TransactionPriority::Normal,
            enable_retry: true,
            retry: RetryPolicy::default(),
            metadata: BTreeMap::new(),
        }
    }
}

impl TransactionOptions {
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_priority(mut self, priority: TransactionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.enable_retry = true;
        self.retry = retry;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.enable_retry = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attempts the manager will make at most.
    pub fn max_attempts(&self) -> u32 {
        if self.enable_retry {
            self.retry.max_attempts()
        } else {
            1
        }
    }

    pub fn begin_options(&self) -> BeginOptions {
        BeginOptions {
            isolation: self.isolation,
            priority: self.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_retry_means_single_attempt() {
        let options = TransactionOptions::default().with_max_retries(5);
        assert_eq!(options.max_attempts(), 6);
        assert_eq!(options.without_retry().max_attempts(), 1);
    }

    #[test]
    fn metadata_accepts_json_values() {
        let options = TransactionOptions::default()
            .with_metadata("operation", "check_out")
            .with_metadata("session_id", 42);
        assert_eq!(options.metadata["session_id"], serde_json::json!(42));
    }
}
