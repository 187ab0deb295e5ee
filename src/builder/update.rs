use crate::error::StoreError;
use crate::types::RowValues;

use super::condition::{WhereClause, impl_where_methods};
use super::{BuiltStatement, require_table};

/// Fluent UPDATE builder. SET values bind before WHERE values.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuilder {
    table: String,
    assignments: Vec<(String, RowValues)>,
    filter: WhereClause,
}

impl UpdateBuilder {
    pub(crate) fn new(table: String) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            filter: WhereClause::default(),
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn set_all<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        self.assignments
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Render the statement.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidStatement` when the table is blank or nothing is assigned.
    pub fn build(&self) -> Result<BuiltStatement, StoreError> {
        let table = require_table(Some(&self.table), "UPDATE")?;
        if self.assignments.is_empty() {
            return Err(StoreError::InvalidStatement(format!(
                "UPDATE {table} has no assignments"
            )));
        }

        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect();
        let mut sql = format!("UPDATE {table} SET {}", sets.join(", "));
        let mut params: Vec<RowValues> =
            self.assignments.iter().map(|(_, v)| v.clone()).collect();
        self.filter.render(&mut sql, &mut params);
        Ok(BuiltStatement::new(sql, params))
    }
}

impl_where_methods!(UpdateBuilder);

#[cfg(test)]
mod tests {
    use super::super::update;
    use super::*;

    #[test]
    fn set_values_precede_filter_values() {
        let stmt = update("users")
            .set("name", "bob")
            .set("active", true)
            .where_equal("id", 7)
            .build()
            .unwrap();
        assert_eq!(stmt.sql(), "UPDATE users SET name = ?, active = ? WHERE id = ?");
        assert_eq!(
            stmt.params(),
            &[
                RowValues::Text("bob".into()),
                RowValues::Bool(true),
                RowValues::Int(7)
            ]
        );
    }

    #[test]
    fn update_without_assignments_is_rejected() {
        let err = update("users").where_equal("id", 1).build().unwrap_err();
        assert!(err.to_string().contains("no assignments"));
    }
}
