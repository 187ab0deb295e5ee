use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::results::{CustomDbRow, ResultSet};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns the rusqlite error if the column cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<RowValues> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

fn column_names(stmt: &Statement<'_>) -> Arc<Vec<String>> {
    Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    )
}

/// Run a prepared statement and materialize every row.
///
/// # Errors
/// Returns the rusqlite error raised while stepping or reading rows.
pub fn build_result_set(stmt: &mut Statement<'_>, params: &[Value]) -> rusqlite::Result<ResultSet> {
    let names = column_names(stmt);
    let col_count = names.len();
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(names);

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

/// Run a prepared statement and keep only the first row; stepping stops there.
///
/// # Errors
/// Returns the rusqlite error raised while stepping or reading the row.
pub fn first_row(stmt: &mut Statement<'_>, params: &[Value]) -> rusqlite::Result<Option<CustomDbRow>> {
    let names = column_names(stmt);
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut row_values = Vec::with_capacity(names.len());
    for i in 0..names.len() {
        row_values.push(sqlite_extract_value_sync(row, i)?);
    }
    Ok(Some(CustomDbRow::new(names, row_values)))
}
