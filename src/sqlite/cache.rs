use std::collections::HashMap;
use std::collections::hash_map::Entry;

use rusqlite::{Connection, Statement};

use crate::error::StoreError;

/// Compiled statements keyed by their exact SQL text.
///
/// Texts that differ only in whitespace or casing compile to separate entries.
/// The cache is unbounded; entries live until [`StatementCache::clear`].
pub(crate) struct StatementCache<'conn> {
    conn: &'conn Connection,
    statements: HashMap<String, Statement<'conn>>,
}

impl<'conn> StatementCache<'conn> {
    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            statements: HashMap::new(),
        }
    }

    pub(crate) fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Fetch the compiled statement for `sql`, compiling it on first use.
    pub(crate) fn prepare(&mut self, sql: &str) -> Result<&mut Statement<'conn>, StoreError> {
        let conn = self.conn;
        match self.statements.entry(sql.to_owned()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let stmt = conn.prepare(sql).map_err(|e| StoreError::query(sql, e))?;
                Ok(entry.insert(stmt))
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.statements.len()
    }

    /// Finalize every cached statement, returning how many were released.
    pub(crate) fn clear(&mut self) -> usize {
        let released = self.statements.len();
        self.statements.clear();
        released
    }
}

/// Positional binding must match the statement's placeholder count exactly.
pub(crate) fn check_binding(
    stmt: &Statement<'_>,
    sql: &str,
    actual: usize,
) -> Result<(), StoreError> {
    let expected = stmt.parameter_count();
    if expected == actual {
        Ok(())
    } else {
        Err(StoreError::Binding {
            sql: sql.to_owned(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_statements_by_exact_text() {
        let conn = Connection::open_in_memory().unwrap();
        let mut cache = StatementCache::new(&conn);
        cache.prepare("SELECT 1").unwrap();
        cache.prepare("SELECT 1").unwrap();
        cache.prepare("select 1").unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn compile_errors_carry_sql() {
        let conn = Connection::open_in_memory().unwrap();
        let mut cache = StatementCache::new(&conn);
        let err = cache.prepare("SELEC nonsense").err().unwrap();
        assert!(matches!(err, StoreError::Query { ref sql, .. } if sql == "SELEC nonsense"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn binding_mismatch_is_reported() {
        let conn = Connection::open_in_memory().unwrap();
        let mut cache = StatementCache::new(&conn);
        let stmt = cache.prepare("SELECT ?, ?").unwrap();
        assert!(check_binding(stmt, "SELECT ?, ?", 2).is_ok());
        let err = check_binding(stmt, "SELECT ?, ?", 3).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Binding {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }
}
