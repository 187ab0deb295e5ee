use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, ThreadId};

use tokio::sync::OwnedMutexGuard;

use crate::builder::BuiltStatement;
use crate::error::StoreError;
use crate::events::EventBus;
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::{SqliteConnection, convert_params};
use crate::types::{ExecuteResult, RowValues};

use super::facade::observed;
use super::{Slot, StoreManager, lock};

tokio::task_local! {
    /// Managers whose transaction closure is running in the current task.
    static ACTIVE_TRANSACTIONS: RefCell<Vec<u64>>;
}

pub(super) fn in_transaction(manager_id: u64) -> bool {
    ACTIVE_TRANSACTIONS
        .try_with(|active| active.borrow().contains(&manager_id))
        .unwrap_or(false)
}

/// Identity of the code currently running: a spawned task, or a thread inside `block_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TaskKey {
    Task(tokio::task::Id),
    Thread(ThreadId),
}

impl TaskKey {
    pub(super) fn current() -> Self {
        tokio::task::try_id().map_or_else(|| TaskKey::Thread(thread::current().id()), TaskKey::Task)
    }
}

/// Task holding a [`StoreTx`] obtained from [`StoreManager::begin`].
pub(super) type TxOwner = Arc<StdMutex<Option<TaskKey>>>;

/// An open transaction holding the store exclusively.
///
/// Other tasks calling the same manager wait until it commits or rolls back.
/// Dropping it unfinished rolls back.
pub struct StoreTx {
    slot: OwnedMutexGuard<Slot>,
    events: EventBus,
    owner: Option<TxOwner>,
    finished: bool,
}

impl StoreTx {
    fn conn(&self) -> Result<&SqliteConnection, StoreError> {
        self.slot.as_ref().ok_or(StoreError::NotConnected)
    }

    /// # Errors
    /// `Binding` or `Query` failures of the statement.
    pub async fn query(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, StoreError> {
        let conn = self.conn()?;
        observed(
            &self.events,
            "query",
            sql,
            conn.query(sql.to_owned(), convert_params(params)),
            ResultSet::len,
        )
        .await
    }

    /// # Errors
    /// `Binding` or `Query` failures of the statement.
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, StoreError> {
        let conn = self.conn()?;
        observed(
            &self.events,
            "query_one",
            sql,
            conn.query_one(sql.to_owned(), convert_params(params)),
            |row| usize::from(row.is_some()),
        )
        .await
    }

    /// # Errors
    /// `Binding` or `Query` failures of the statement.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecuteResult, StoreError> {
        let conn = self.conn()?;
        observed(
            &self.events,
            "execute",
            sql,
            conn.execute(sql.to_owned(), convert_params(params)),
            |result| result.rows_affected,
        )
        .await
    }

    /// Runs inside this transaction; no savepoint of its own.
    ///
    /// # Errors
    /// The `Query` error of the failing statement.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        observed(
            &self.events,
            "execute_batch",
            sql,
            conn.execute_batch(sql.to_owned()),
            |_| 0,
        )
        .await
    }

    /// # Errors
    /// Same as [`StoreTx::query`].
    pub async fn query_statement(&self, statement: &BuiltStatement) -> Result<ResultSet, StoreError> {
        self.query(statement.sql(), statement.params()).await
    }

    /// # Errors
    /// Same as [`StoreTx::execute`].
    pub async fn execute_statement(
        &self,
        statement: &BuiltStatement,
    ) -> Result<ExecuteResult, StoreError> {
        self.execute(statement.sql(), statement.params()).await
    }

    /// Make every write of this transaction durable.
    ///
    /// A failed commit is rolled back before the error is returned.
    ///
    /// # Errors
    /// The `SQLite` error raised by `COMMIT`.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let conn = self.conn()?;
        if let Err(err) = conn.commit().await {
            if let Err(rollback_err) = conn.rollback().await {
                self.events.error("rollback", &rollback_err);
            }
            self.events.error("commit", &err);
            return Err(err);
        }
        Ok(())
    }

    /// Discard every write of this transaction.
    ///
    /// # Errors
    /// The `SQLite` error raised by `ROLLBACK`.
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let outcome = self.conn()?.rollback().await;
        if let Err(err) = &outcome {
            self.events.error("rollback", err);
        }
        outcome
    }
}

impl Drop for StoreTx {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            lock(&owner).take();
        }
        if self.finished {
            return;
        }
        if let Some(conn) = self.slot.as_ref() {
            tracing::debug!("unfinished transaction dropped, rolling back");
            conn.rollback_detached();
        }
    }
}

impl fmt::Debug for StoreTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTx")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl StoreManager {
    /// Open a transaction and hand back its handle.
    ///
    /// Use the returned [`StoreTx`] for every statement until it is finished. Other tasks
    /// calling the manager wait for it to end; the task holding it gets `NestedTransaction`
    /// from any call on the manager instead.
    ///
    /// # Errors
    /// `NotConnected`, or `NestedTransaction` when this task already holds a transaction
    /// of this manager.
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        let mut tx = self.open_transaction().await?;
        *lock(&self.shared.tx_owner) = Some(TaskKey::current());
        tx.owner = Some(Arc::clone(&self.shared.tx_owner));
        Ok(tx)
    }

    async fn open_transaction(&self) -> Result<StoreTx, StoreError> {
        self.ensure_outside_transaction("begin")?;
        let slot = Arc::clone(&self.shared.slot).lock_owned().await;
        let Some(conn) = slot.as_ref() else {
            return Err(self.fail("begin", StoreError::NotConnected));
        };
        conn.begin().await.map_err(|err| self.fail("begin", err))?;
        Ok(StoreTx {
            slot,
            events: self.shared.events.clone(),
            owner: None,
            finished: false,
        })
    }

    /// Run `work` as one atomic unit: committed when it returns `Ok`, rolled back otherwise.
    ///
    /// ```rust,no_run
    /// # async fn demo(store: &sqlite_steward::StoreManager) -> Result<(), sqlite_steward::StoreError> {
    /// use sqlite_steward::prelude::*;
    ///
    /// store
    ///     .transaction(async |tx: &mut StoreTx| {
    ///         tx.execute("INSERT INTO accounts (id, balance) VALUES (?, ?)", &[1.into(), 100.into()]).await?;
    ///         tx.execute("UPDATE totals SET sum = sum + ?", &[100.into()]).await?;
    ///         Ok(())
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// Calling back into this manager from inside `work` fails with `NestedTransaction`.
    ///
    /// # Errors
    /// `Transaction` wrapping the first failure inside `work` or at commit; `NotConnected`
    /// and `NestedTransaction` before anything starts.
    pub async fn transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: AsyncFnOnce(&mut StoreTx) -> Result<T, StoreError>,
    {
        let mut tx = self.open_transaction().await?;

        let mut active = ACTIVE_TRANSACTIONS
            .try_with(|active| active.borrow().clone())
            .unwrap_or_default();
        active.push(self.shared.id);
        let outcome = ACTIVE_TRANSACTIONS
            .scope(RefCell::new(active), work(&mut tx))
            .await;

        match outcome {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(err) => Err(StoreError::Transaction {
                    source: Box::new(err),
                }),
            },
            Err(err) => {
                // a failed rollback is already reported on the event channel
                let _ = tx.rollback().await;
                let err = StoreError::Transaction {
                    source: Box::new(err),
                };
                self.shared.events.error("transaction", &err);
                Err(err)
            }
        }
    }
}
