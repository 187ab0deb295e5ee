use crate::error::StoreError;
use crate::types::RowValues;

use super::condition::placeholders;
use super::{BuiltStatement, require_table};

/// Conflict resolution prefix for INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conflict {
    #[default]
    Abort,
    Replace,
    Ignore,
}

/// Fluent INSERT builder. Column order follows the first row's insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertBuilder {
    table: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    conflict: Conflict,
    mismatch: Option<String>,
}

impl InsertBuilder {
    #[must_use]
    pub fn into(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the single row to insert, replacing any rows added before.
    #[must_use]
    pub fn value<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        self.columns.clear();
        self.rows.clear();
        self.mismatch = None;
        self.values_row(pairs)
    }

    /// Append a row for a multi-row insert; every row must name the same columns in the same order.
    #[must_use]
    pub fn values_row<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        let (columns, values): (Vec<String>, Vec<RowValues>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        if self.rows.is_empty() {
            self.columns = columns;
        } else if columns != self.columns && self.mismatch.is_none() {
            self.mismatch = Some(format!(
                "row {} has columns ({}) but the first row has ({})",
                self.rows.len() + 1,
                columns.join(", "),
                self.columns.join(", ")
            ));
        }
        self.rows.push(values);
        self
    }

    #[must_use]
    pub fn or_replace(mut self) -> Self {
        self.conflict = Conflict::Replace;
        self
    }

    #[must_use]
    pub fn or_ignore(mut self) -> Self {
        self.conflict = Conflict::Ignore;
        self
    }

    /// Render the statement.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidStatement` when the table or values are missing, or rows disagree on columns.
    pub fn build(&self) -> Result<BuiltStatement, StoreError> {
        let table = require_table(self.table.as_ref(), "INSERT")?;
        if let Some(mismatch) = &self.mismatch {
            return Err(StoreError::InvalidStatement(mismatch.clone()));
        }
        if self.rows.is_empty() || self.columns.is_empty() {
            return Err(StoreError::InvalidStatement(format!(
                "INSERT into {table} has no values"
            )));
        }

        let verb = match self.conflict {
            Conflict::Abort => "INSERT INTO ",
            Conflict::Replace => "INSERT OR REPLACE INTO ",
            Conflict::Ignore => "INSERT OR IGNORE INTO ",
        };
        let row_placeholders = format!("({})", placeholders(self.columns.len()));
        let mut sql = String::from(verb);
        sql.push_str(&table);
        sql.push_str(" (");
        sql.push_str(&self.columns.join(", "));
        sql.push_str(") VALUES ");
        sql.push_str(&vec![row_placeholders.as_str(); self.rows.len()].join(", "));

        let params: Vec<RowValues> = self.rows.iter().flatten().cloned().collect();
        Ok(BuiltStatement::new(sql, params))
    }
}
