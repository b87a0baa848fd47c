//! Transaction manager
//!
//! Runs a unit of work inside a store transaction: bounded begin, overall
//! deadline, commit, rollback on every failure path, and the crate's only
//! retry loop for conflicts and deadlocks.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::{TransactionContext, TransactionStatus};
use super::handle::TxHandle;
use super::options::TransactionOptions;
use super::stats::{TransactionStats, TransactionStatsSnapshot};
use crate::domain::{DomainResult, Store, StoreTransaction, TransactionPriority};
use crate::shared::errors::{DomainError, StoreError, TimeoutPhase, TransactionError};

/// What one `execute` call produced.
#[derive(Debug)]
pub struct TransactionResult<T> {
    pub outcome: Result<T, TransactionError>,
    pub context: TransactionContext,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl<T> TransactionResult<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<T, TransactionError> {
        self.outcome
    }

    /// Collapses into a domain result, unwrapping aborted work back to the
    /// error the work itself returned.
    pub fn into_domain(self) -> DomainResult<T> {
        match self.outcome {
            Ok(value) => Ok(value),
            Err(TransactionError::Aborted { source, .. }) => Err(*source),
            Err(other) => Err(DomainError::Transaction(other)),
        }
    }
}

enum AttemptFailure {
    Timeout(TimeoutPhase),
    Failed(DomainError),
}

/// Keeps a context listed as active until dropped, including when the
/// caller drops the `execute` future mid-flight.
struct Registration<'a> {
    active: &'a DashMap<Uuid, TransactionContext>,
    id: Uuid,
}

impl<'a> Registration<'a> {
    fn new(active: &'a DashMap<Uuid, TransactionContext>, context: &TransactionContext) -> Self {
        active.insert(context.id, context.clone());
        Self {
            active,
            id: context.id,
        }
    }

    fn update(&self, context: &TransactionContext) {
        self.active.insert(self.id, context.clone());
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

pub struct TransactionManager {
    store: Arc<dyn Store>,
    defaults: TransactionOptions,
    stats: TransactionStats,
    active: DashMap<Uuid, TransactionContext>,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_defaults(store, TransactionOptions::default())
    }

    pub fn with_defaults(store: Arc<dyn Store>, defaults: TransactionOptions) -> Self {
        Self {
            store,
            defaults,
            stats: TransactionStats::default(),
            active: DashMap::new(),
        }
    }

    /// Fresh copy of the configured defaults, ready for per-call tweaks.
    pub fn options(&self) -> TransactionOptions {
        self.defaults.clone()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn stats(&self) -> TransactionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Contexts of transactions currently in flight, oldest first.
    pub fn active_transactions(&self) -> Vec<TransactionContext> {
        let mut contexts: Vec<TransactionContext> =
            self.active.iter().map(|e| e.value().clone()).collect();
        contexts.sort_by_key(|c| c.started_at);
        contexts
    }

    /// Runs `work` in a fresh store transaction, retrying it from scratch
    /// on contention while the retry budget and the deadline allow.
    ///
    /// `work` may run several times. It must capture only owned, cloneable
    /// state and perform every store access through the handle.
    pub async fn execute<T, F>(&self, options: TransactionOptions, work: F) -> TransactionResult<T>
    where
        T: Send,
        F: for<'t> Fn(&'t mut TxHandle) -> BoxFuture<'t, DomainResult<T>> + Send + Sync,
    {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + options.timeout;
        let max_attempts = options.max_attempts();
        let mut context = TransactionContext::new(&options);
        let registration = Registration::new(&self.active, &context);

        self.stats.record_started();
        metrics::counter!("parking_transactions_started_total").increment(1);

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            context.attempt = attempt;
            context.status = TransactionStatus::Active;
            registration.update(&context);

            let error = match self.run_attempt(&options, &mut context, deadline, &work).await {
                Ok(value) => break Ok(value),
                Err(AttemptFailure::Timeout(phase)) => {
                    break Err(TransactionError::Timeout {
                        transaction_id: context.id,
                        phase,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    })
                }
                Err(AttemptFailure::Failed(error)) => error,
            };

            if !error.is_retryable() {
                break Err(self.classify(error, &context, attempt));
            }

            let reason = contention_reason(&error);
            self.record_contention(reason);

            if attempt >= max_attempts || !may_retry(options.priority, &error) {
                break Err(self.classify(error, &context, attempt));
            }

            let delay = options
                .retry
                .delay_for(attempt, options.priority.backoff_divisor());
            if tokio::time::Instant::now() + delay >= deadline {
                break Err(TransactionError::Timeout {
                    transaction_id: context.id,
                    phase: TimeoutPhase::Execute,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }

            self.stats.record_retry();
            metrics::counter!("parking_transaction_retries_total", "reason" => reason).increment(1);
            debug!(
                transaction_id = %context.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying transaction"
            );
            tokio::time::sleep(delay).await;
        };

        let status = match &outcome {
            Ok(_) => TransactionStatus::Committed,
            Err(TransactionError::Timeout { .. }) => TransactionStatus::Timeout,
            Err(TransactionError::Aborted { .. }) => TransactionStatus::RolledBack,
            Err(_) => TransactionStatus::Failed,
        };
        context.finish(status);
        drop(registration);
        self.record_outcome(&context, &outcome, started);

        TransactionResult {
            outcome,
            context,
            attempts: attempt,
        }
    }

    /// Runs `work` inside a savepoint of an already open transaction under
    /// a child context. A failing unit only undoes its own writes; the
    /// enclosing work decides whether to continue.
    ///
    /// Contention errors come back wrapped in `Aborted`, so the enclosing
    /// work can propagate them with `into_domain()?` and still be retried.
    pub async fn execute_nested<T, F>(
        &self,
        tx: &mut TxHandle,
        name: &str,
        work: F,
    ) -> TransactionResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut TxHandle) -> BoxFuture<'t, DomainResult<T>> + Send,
    {
        let parent_id = tx.transaction_id();
        let savepoint = match tx.create_savepoint(name).await {
            Ok(id) => id,
            Err(e) => {
                let mut context = tx.context().child(name);
                context.finish(TransactionStatus::Failed);
                return TransactionResult {
                    outcome: Err(self.classify(e, &context, 1)),
                    context,
                    attempts: 1,
                };
            }
        };

        let mut child = tx.context().child(name);
        let registration = Registration::new(&self.active, &child);
        debug!(transaction_id = %child.id, parent_id = %parent_id, unit = name, "nested unit started");

        // Work sees the child id (audit entries, logs) but the parent's
        // savepoint stack, so the savepoint it rolls back to is reachable.
        let mut scoped = tx.context().clone();
        scoped.id = child.id;
        scoped.parent_id = Some(parent_id);
        let parent = tx.replace_context(scoped);
        let result = work(tx).await;
        let scoped = tx.replace_context(parent);
        child.savepoints = scoped.savepoints;

        let outcome = match result {
            Ok(value) => match tx.release_savepoint(savepoint).await {
                Ok(()) => Ok(value),
                Err(e) => Err(self.classify(e, &child, 1)),
            },
            Err(error) => {
                if let Err(rollback_error) = tx.rollback_to_savepoint(savepoint).await {
                    warn!(
                        transaction_id = %child.id,
                        error = %rollback_error,
                        "failed to roll back nested unit"
                    );
                } else if let Err(release_error) = tx.release_savepoint(savepoint).await {
                    warn!(
                        transaction_id = %child.id,
                        error = %release_error,
                        "failed to release nested savepoint"
                    );
                }
                Err(TransactionError::Aborted {
                    transaction_id: child.id,
                    source: Box::new(error),
                })
            }
        };

        child.finish(if outcome.is_ok() {
            TransactionStatus::Committed
        } else {
            TransactionStatus::RolledBack
        });
        drop(registration);

        TransactionResult {
            outcome,
            context: child,
            attempts: 1,
        }
    }

    async fn run_attempt<T, F>(
        &self,
        options: &TransactionOptions,
        context: &mut TransactionContext,
        deadline: tokio::time::Instant,
        work: &F,
    ) -> Result<T, AttemptFailure>
    where
        T: Send,
        F: for<'t> Fn(&'t mut TxHandle) -> BoxFuture<'t, DomainResult<T>> + Send + Sync,
    {
        let tx = match tokio::time::timeout(options.max_wait, self.store.begin(options.begin_options())).await
        {
            Err(_) | Ok(Err(StoreError::LockTimeout)) => {
                return Err(AttemptFailure::Timeout(TimeoutPhase::Acquire))
            }
            Ok(Err(e)) => return Err(AttemptFailure::Failed(e.into())),
            Ok(Ok(tx)) => tx,
        };

        context.savepoints.clear();
        let mut handle = TxHandle::new(tx, context.clone());
        let result = tokio::time::timeout_at(deadline, work(&mut handle)).await;
        let (tx, ctx) = handle.into_parts();
        *context = ctx;

        match result {
            Err(_) => {
                self.rollback(tx, context).await;
                Err(AttemptFailure::Timeout(TimeoutPhase::Execute))
            }
            Ok(Err(error)) => {
                self.rollback(tx, context).await;
                Err(AttemptFailure::Failed(error))
            }
            // A commit cut short by the deadline drops the transaction,
            // which rolls it back.
            Ok(Ok(value)) => match tokio::time::timeout_at(deadline, tx.commit()).await {
                Err(_) => Err(AttemptFailure::Timeout(TimeoutPhase::Execute)),
                Ok(Err(e)) => Err(AttemptFailure::Failed(e.into())),
                Ok(Ok(())) => Ok(value),
            },
        }
    }

    async fn rollback(&self, tx: Box<dyn StoreTransaction>, context: &TransactionContext) {
        if let Err(e) = tx.rollback().await {
            warn!(transaction_id = %context.id, error = %e, "rollback failed");
        }
    }

    fn classify(&self, error: DomainError, context: &TransactionContext, attempts: u32) -> TransactionError {
        match error {
            DomainError::Store(e @ StoreError::Conflict { .. }) => TransactionError::Conflict {
                transaction_id: context.id,
                attempts,
                detail: e.to_string(),
            },
            DomainError::Store(StoreError::Deadlock(detail)) => TransactionError::Deadlock {
                transaction_id: context.id,
                attempts,
                detail,
            },
            DomainError::Savepoint(e) => TransactionError::Savepoint(e),
            DomainError::Transaction(e) => e,
            other => TransactionError::Aborted {
                transaction_id: context.id,
                source: Box::new(other),
            },
        }
    }

    fn record_contention(&self, reason: &'static str) {
        if reason == "deadlock" {
            self.stats.record_deadlock();
            metrics::counter!("parking_transaction_deadlocks_total").increment(1);
        } else {
            self.stats.record_conflict();
            metrics::counter!("parking_transaction_conflicts_total").increment(1);
        }
    }

    fn record_outcome<T>(
        &self,
        context: &TransactionContext,
        outcome: &Result<T, TransactionError>,
        started: Instant,
    ) {
        match context.status {
            TransactionStatus::Committed => self.stats.record_committed(),
            TransactionStatus::RolledBack => self.stats.record_rolled_back(),
            TransactionStatus::Timeout => {
                self.stats.record_timeout();
                metrics::counter!("parking_transaction_timeouts_total").increment(1);
            }
            _ => self.stats.record_failed(),
        }
        metrics::counter!("parking_transactions_total", "outcome" => context.status.as_str())
            .increment(1);
        metrics::histogram!("parking_transaction_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(_) => debug!(
                transaction_id = %context.id,
                attempts = context.attempt,
                elapsed_ms = context.elapsed_ms(),
                "transaction committed"
            ),
            Err(TransactionError::Aborted { source, .. }) => debug!(
                transaction_id = %context.id,
                kind = source.kind().as_str(),
                error = %source,
                "transaction rolled back"
            ),
            Err(TransactionError::Timeout { phase, elapsed_ms, .. }) => warn!(
                transaction_id = %context.id,
                phase = %phase,
                elapsed_ms,
                "transaction timed out"
            ),
            Err(e) => info!(
                transaction_id = %context.id,
                attempts = context.attempt,
                error = %e,
                "transaction failed"
            ),
        }
    }
}

fn contention_reason(error: &DomainError) -> &'static str {
    match error {
        DomainError::Store(StoreError::Deadlock(_)) => "deadlock",
        _ => "conflict",
    }
}

/// Low-priority work yields to everything else once it has been chosen as
/// a deadlock victim.
fn may_retry(priority: TransactionPriority, error: &DomainError) -> bool {
    !(priority == TransactionPriority::Low && contention_reason(error) == "deadlock")
}

// ── Tests ──────────────────────────────────────────────────────
