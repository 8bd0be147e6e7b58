//! In-memory transactions.
//!
//! Only one transaction runs at a time: [`InMemoryTransaction`] holds the
//! executor's transaction lock until it is committed, rolled back or dropped.
//! Statements and tracking-table changes are buffered and applied to the
//! shared state on commit; reads inside the transaction see its own writes.

use crate::{InMemoryExecutor, InMemoryExecutorError, State, TrackingOp, apply_tracking, parse_tracking};
use async_trait::async_trait;
use stepwise_core::executor::SqlTransaction;
use stepwise_core::statement::Statement;
use stepwise_core::value::{Row, Value};
use tokio::sync::OwnedMutexGuard;

/// Pending changes for an in-memory transaction.
pub struct InMemoryTransaction {
    /// Executor whose state receives the changes on commit
    executor: InMemoryExecutor,
    /// Tracking table as seen from inside the transaction
    shadow: State,
    /// Tracking-table changes to replay on commit
    ops: Vec<TrackingOp>,
    /// Other statements, logged on commit
    statements: Vec<Statement>,
    /// Lock guard held for transaction duration
    _lock: OwnedMutexGuard<()>,
    /// Whether the transaction has been consumed (committed or rolled back)
    consumed: bool,
}

impl InMemoryTransaction {
    pub(crate) fn new(executor: InMemoryExecutor, shadow: State, lock: OwnedMutexGuard<()>) -> Self {
        Self {
            executor,
            shadow,
            ops: Vec::new(),
            statements: Vec::new(),
            _lock: lock,
            consumed: false,
        }
    }
}

#[async_trait]
impl SqlTransaction for InMemoryTransaction {
    type Error = InMemoryExecutorError;

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error> {
        let response = {
            let state = self.executor.state.lock().await;
            state.check_failure(sql)?;
            state.response(sql)
        };

        match parse_tracking(&self.executor.table, sql, params)? {
            Some(op) => {
                let rows = apply_tracking(&mut self.shadow, &self.executor.table, op.clone())?;
                if op != TrackingOp::Select {
                    self.ops.push(op);
                }
                Ok(rows)
            }
            None => {
                log::debug!("InMemoryTransaction buffering: {sql}");
                self.statements
                    .push(Statement::with_params(sql, params.to_vec()));
                Ok(response)
            }
        }
    }

    async fn execute_script(&mut self, sql: &str) -> Result<(), Self::Error> {
        self.execute(sql, &[]).await?;
        Ok(())
    }

    /// Applies buffered tracking changes, then logs buffered statements.
    ///
    /// The changes are replayed on a copy of the tracking table first; if any
    /// of them fails, shared state is left as it was.
    async fn commit(mut self) -> Result<(), Self::Error> {
        self.consumed = true;

        let mut state = self.executor.state.lock().await;
        let mut staged = State {
            tracking_created: state.tracking_created,
            tracking: state.tracking.clone(),
            ..State::default()
        };
        for op in std::mem::take(&mut self.ops) {
            apply_tracking(&mut staged, &self.executor.table, op)?;
        }
        state.tracking_created = staged.tracking_created;
        state.tracking = staged.tracking;
        state.executed.append(&mut self.statements);

        // Lock is released when self is dropped
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), Self::Error> {
        self.consumed = true;
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.consumed {
            log::debug!(
                "InMemoryTransaction dropped without commit() or rollback(). \
                 Changes were discarded (implicit rollback)."
            );
        }
    }
}
