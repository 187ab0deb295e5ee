use crate::types::RowValues;

/// Comparison operators accepted by `where_op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::NotEq => "<>",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Compare {
        column: String,
        op: Comparison,
        value: RowValues,
    },
    In {
        column: String,
        values: Vec<RowValues>,
    },
    Like {
        column: String,
        pattern: String,
    },
    Null {
        column: String,
        negated: bool,
    },
}

/// Ordered list of WHERE conditions shared by SELECT, UPDATE and DELETE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<(Connector, Condition)>,
}

impl WhereClause {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub(crate) fn compare(&mut self, column: String, op: Comparison, value: RowValues) {
        self.push(Connector::And, Condition::Compare { column, op, value });
    }

    pub(crate) fn or_compare(&mut self, column: String, op: Comparison, value: RowValues) {
        self.push(Connector::Or, Condition::Compare { column, op, value });
    }

    pub(crate) fn is_in(&mut self, column: String, values: Vec<RowValues>) {
        self.push(Connector::And, Condition::In { column, values });
    }

    pub(crate) fn like(&mut self, column: String, pattern: String) {
        self.push(Connector::And, Condition::Like { column, pattern });
    }

    pub(crate) fn null(&mut self, column: String, negated: bool) {
        self.push(Connector::And, Condition::Null { column, negated });
    }

    fn push(&mut self, connector: Connector, condition: Condition) {
        self.conditions.push((connector, condition));
    }

    /// Append ` WHERE ...` to `sql`, pushing bound values onto `params` in placeholder order.
    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<RowValues>) {
        for (i, (connector, condition)) in self.conditions.iter().enumerate() {
            if i == 0 {
                sql.push_str(" WHERE ");
            } else {
                sql.push_str(match connector {
                    Connector::And => " AND ",
                    Connector::Or => " OR ",
                });
            }
            match condition {
                Condition::Compare { column, op, value } => {
                    sql.push_str(column);
                    sql.push(' ');
                    sql.push_str(op.as_sql());
                    sql.push_str(" ?");
                    params.push(value.clone());
                }
                Condition::In { column, values } => {
                    if values.is_empty() {
                        // IN () is not valid SQL; an empty set matches nothing.
                        sql.push_str("0 = 1");
                    } else {
                        sql.push_str(column);
                        sql.push_str(" IN (");
                        sql.push_str(&placeholders(values.len()));
                        sql.push(')');
                        params.extend(values.iter().cloned());
                    }
                }
                Condition::Like { column, pattern } => {
                    sql.push_str(column);
                    sql.push_str(" LIKE ?");
                    params.push(RowValues::Text(pattern.clone()));
                }
                Condition::Null { column, negated } => {
                    sql.push_str(column);
                    sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
                }
            }
        }
    }
}

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Where-family methods for any builder with a `filter: WhereClause` field.
macro_rules! impl_where_methods {
    ($builder:ty) => {
        impl $builder {
            #[must_use]
            pub fn where_equal(
                mut self,
                column: impl Into<String>,
                value: impl Into<$crate::types::RowValues>,
            ) -> Self {
                self.filter.compare(
                    column.into(),
                    $crate::builder::Comparison::Eq,
                    value.into(),
                );
                self
            }

            #[must_use]
            pub fn or_where_equal(
                mut self,
                column: impl Into<String>,
                value: impl Into<$crate::types::RowValues>,
            ) -> Self {
                self.filter.or_compare(
                    column.into(),
                    $crate::builder::Comparison::Eq,
                    value.into(),
                );
                self
            }

            #[must_use]
            pub fn where_not_equal(
                mut self,
                column: impl Into<String>,
                value: impl Into<$crate::types::RowValues>,
            ) -> Self {
                self.filter.compare(
                    column.into(),
                    $crate::builder::Comparison::NotEq,
                    value.into(),
                );
                self
            }

            #[must_use]
            pub fn where_op(
                mut self,
                column: impl Into<String>,
                op: $crate::builder::Comparison,
                value: impl Into<$crate::types::RowValues>,
            ) -> Self {
                self.filter.compare(column.into(), op, value.into());
                self
            }

            #[must_use]
            pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
            where
                I: IntoIterator<Item = V>,
                V: Into<$crate::types::RowValues>,
            {
                self.filter
                    .is_in(column.into(), values.into_iter().map(Into::into).collect());
                self
            }

            #[must_use]
            pub fn where_like(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
                self.filter.like(column.into(), pattern.into());
                self
            }

            #[must_use]
            pub fn where_null(mut self, column: impl Into<String>) -> Self {
                self.filter.null(column.into(), false);
                self
            }

            #[must_use]
            pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
                self.filter.null(column.into(), true);
                self
            }
        }
    };
}

pub(crate) use impl_where_methods;
