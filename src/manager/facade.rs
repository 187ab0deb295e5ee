use std::future::Future;
use std::time::Instant;

use crate::builder::BuiltStatement;
use crate::error::StoreError;
use crate::events::{EventBus, EventPayload};
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::convert_params;
use crate::types::{ExecuteResult, RowValues};

use super::StoreManager;

/// Time one statement and report it on the event channel.
///
/// Only the SQL text is reported; parameter values never leave the caller.
pub(super) async fn observed<T, Fut>(
    events: &EventBus,
    operation: &str,
    sql: &str,
    run: Fut,
    rows: impl FnOnce(&T) -> usize,
) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    match run.await {
        Ok(value) => {
            events.emit(EventPayload::Query {
                sql: sql.to_owned(),
                rows: rows(&value),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
            Ok(value)
        }
        Err(err) => {
            events.error(operation, &err);
            Err(err)
        }
    }
}

impl StoreManager {
    /// Run a row-returning statement. No rows is an empty [`ResultSet`], not an error.
    ///
    /// # Errors
    /// `NotConnected`, `Binding` when `params` does not match the placeholders, or `Query`.
    pub async fn query(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, StoreError> {
        let conn = self.connection("query").await?;
        observed(
            &self.shared.events,
            "query",
            sql,
            conn.query(sql.to_owned(), convert_params(params)),
            ResultSet::len,
        )
        .await
    }

    /// First row in the engine's order, or `None` when nothing matches.
    ///
    /// # Errors
    /// Same as [`StoreManager::query`].
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, StoreError> {
        let conn = self.connection("query_one").await?;
        observed(
            &self.shared.events,
            "query_one",
            sql,
            conn.query_one(sql.to_owned(), convert_params(params)),
            |row| usize::from(row.is_some()),
        )
        .await
    }

    /// Run a mutating statement.
    ///
    /// # Errors
    /// Same as [`StoreManager::query`]; constraint violations surface as `Query`.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecuteResult, StoreError> {
        let conn = self.connection("execute").await?;
        observed(
            &self.shared.events,
            "execute",
            sql,
            conn.execute(sql.to_owned(), convert_params(params)),
            |result| result.rows_affected,
        )
        .await
    }

    /// Run a multi-statement script atomically. Scripts take no parameters.
    ///
    /// # Errors
    /// `NotConnected`, or the `Query` error of the failing statement (nothing is kept).
    pub async fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.connection("execute_batch").await?;
        observed(
            &self.shared.events,
            "execute_batch",
            sql,
            conn.execute_batch(sql.to_owned()),
            |_| 0,
        )
        .await
    }

    /// [`StoreManager::query`] for a builder output.
    ///
    /// # Errors
    /// Same as [`StoreManager::query`].
    pub async fn query_statement(&self, statement: &BuiltStatement) -> Result<ResultSet, StoreError> {
        self.query(statement.sql(), statement.params()).await
    }

    /// [`StoreManager::execute`] for a builder output.
    ///
    /// # Errors
    /// Same as [`StoreManager::execute`].
    pub async fn execute_statement(
        &self,
        statement: &BuiltStatement,
    ) -> Result<ExecuteResult, StoreError> {
        self.execute(statement.sql(), statement.params()).await
    }

    /// Compiled statements currently held for this connection.
    ///
    /// # Errors
    /// `NotConnected` without a handle.
    pub async fn cached_statement_count(&self) -> Result<usize, StoreError> {
        let conn = self.connection("cached_statement_count").await?;
        conn.cached_statement_count().await
    }
}
