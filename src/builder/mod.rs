//! Composable SQL text builders.
//!
//! Builders never perform I/O. Identifiers are emitted as given (pass untrusted
//! names through [`escape_identifier`] first); every value becomes a positional
//! `?` placeholder with a matching entry in [`BuiltStatement::params`].
//!
//! ```rust
//! use sqlite_steward::builder;
//!
//! let stmt = builder::select(["a", "b"]).from("t").where_equal("id", 5).build()?;
//! assert_eq!(stmt.sql(), "SELECT a, b FROM t WHERE id = ?");
//! # Ok::<(), sqlite_steward::StoreError>(())
//! ```

mod condition;
mod delete;
mod insert;
mod select;
mod update;

pub use condition::{Comparison, WhereClause};
pub use delete::DeleteBuilder;
pub use insert::{Conflict, InsertBuilder};
pub use select::{Order, SelectBuilder};
pub use update::UpdateBuilder;

use crate::types::RowValues;

/// SQL text plus its positional parameters, ready for the query facade.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    sql: String,
    params: Vec<RowValues>,
}

impl BuiltStatement {
    pub(crate) fn new(sql: String, params: Vec<RowValues>) -> Self {
        Self { sql, params }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Vec<RowValues>) {
        (self.sql, self.params)
    }
}

/// Quote an identifier for safe inclusion in SQL text.
///
/// Embedded double quotes are doubled, so `my"col` becomes `"my""col"`.
#[must_use]
pub fn escape_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Start a SELECT over the given columns.
pub fn select<I, S>(columns: I) -> SelectBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SelectBuilder::new(columns.into_iter().map(Into::into).collect())
}

/// Start a `SELECT *`.
#[must_use]
pub fn select_all() -> SelectBuilder {
    SelectBuilder::new(Vec::new())
}

#[must_use]
pub fn insert() -> InsertBuilder {
    InsertBuilder::default()
}

pub fn update(table: impl Into<String>) -> UpdateBuilder {
    UpdateBuilder::new(table.into())
}

#[must_use]
pub fn delete() -> DeleteBuilder {
    DeleteBuilder::default()
}

fn require_table(table: Option<&String>, kind: &str) -> Result<String, crate::StoreError> {
    match table {
        Some(t) if !t.trim().is_empty() => Ok(t.clone()),
        _ => Err(crate::StoreError::InvalidStatement(format!(
            "{kind} statement has no table"
        ))),
    }
}
