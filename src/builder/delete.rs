use crate::error::StoreError;
use crate::types::RowValues;

use super::condition::{WhereClause, impl_where_methods};
use super::{BuiltStatement, require_table};

/// Fluent DELETE builder. Without a filter every row of the table is deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteBuilder {
    table: Option<String>,
    filter: WhereClause,
}

impl DeleteBuilder {
    #[must_use]
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Render the statement.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidStatement` when no table was given.
    pub fn build(&self) -> Result<BuiltStatement, StoreError> {
        let table = require_table(self.table.as_ref(), "DELETE")?;
        let mut sql = format!("DELETE FROM {table}");
        let mut params: Vec<RowValues> = Vec::new();
        self.filter.render(&mut sql, &mut params);
        Ok(BuiltStatement::new(sql, params))
    }
}

impl_where_methods!(DeleteBuilder);
