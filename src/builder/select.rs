use crate::error::StoreError;
use crate::types::RowValues;

use super::condition::{WhereClause, impl_where_methods};
use super::{BuiltStatement, require_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    table: String,
    on: String,
}

/// Fluent SELECT builder. Create one with [`select`](super::select) or [`select_all`](super::select_all).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectBuilder {
    columns: Vec<String>,
    distinct: bool,
    table: Option<String>,
    joins: Vec<Join>,
    filter: WhereClause,
    group_by: Vec<String>,
    having: Option<String>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    pub(crate) fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            distinct: false,
            table: None,
            joins: Vec::new(),
            filter: WhereClause::default(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// `INNER JOIN table ON condition`; the condition is raw SQL without parameters.
    #[must_use]
    pub fn join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Inner,
            table: table.into(),
            on: on.into(),
        });
        self
    }

    #[must_use]
    pub fn left_join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Left,
            table: table.into(),
            on: on.into(),
        });
        self
    }

    #[must_use]
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Raw HAVING expression; only rendered together with GROUP BY.
    #[must_use]
    pub fn having(mut self, expression: impl Into<String>) -> Self {
        self.having = Some(expression.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render the statement.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidStatement` if no table was given, or HAVING is set without GROUP BY.
    pub fn build(&self) -> Result<BuiltStatement, StoreError> {
        let table = require_table(self.table.as_ref(), "SELECT")?;
        if self.having.is_some() && self.group_by.is_empty() {
            return Err(StoreError::InvalidStatement(
                "HAVING requires GROUP BY".into(),
            ));
        }

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&table);

        for join in &self.joins {
            sql.push_str(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            sql.push_str(&join.table);
            sql.push_str(" ON ");
            sql.push_str(&join.on);
        }

        let mut params: Vec<RowValues> = Vec::new();
        self.filter.render(&mut sql, &mut params);

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
            if let Some(having) = &self.having {
                sql.push_str(" HAVING ");
                sql.push_str(having);
            }
        }

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, order)| match order {
                    Order::Asc => format!("{column} ASC"),
                    Order::Desc => format!("{column} DESC"),
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(RowValues::Int(clamp_i64(limit)));
                params.push(RowValues::Int(clamp_i64(offset)));
            }
            (Some(limit), None) => {
                sql.push_str(" LIMIT ?");
                params.push(RowValues::Int(clamp_i64(limit)));
            }
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(RowValues::Int(clamp_i64(offset)));
            }
            (None, None) => {}
        }

        Ok(BuiltStatement::new(sql, params))
    }
}

impl_where_methods!(SelectBuilder);

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
