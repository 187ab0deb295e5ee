use std::fs;

use rusqlite::{Connection, OpenFlags};

use crate::config::{PragmaSettings, StoreConfig};
use crate::error::StoreError;

// influenced design: https://www.powersync.com/blog/sqlite-optimizations-for-ultra-high-performance

/// Make sure the store file can be opened as configured, creating its parent directory.
///
/// # Errors
/// Returns `StoreError::Configuration` when `must_exist` is set and the file is missing, or
/// `StoreError::Io` when the parent directory cannot be created.
pub fn prepare_store_path(config: &StoreConfig) -> Result<(), StoreError> {
    if config.is_memory() {
        return Ok(());
    }
    let exists = config.path.exists();
    if !exists && (config.open.must_exist || config.open.read_only) {
        return Err(StoreError::Configuration(format!(
            "store file {} does not exist",
            config.path.display()
        )));
    }
    if let Some(parent) = config.path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Open the handle with the configured flags and busy timeout, then apply pragmas.
///
/// Returns the connection together with the journal mode `SQLite` reports.
///
/// # Errors
/// Returns `StoreError::Sqlite` if opening the file or applying a pragma fails.
pub fn open_connection(config: &StoreConfig) -> Result<(Connection, String), StoreError> {
    let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if config.open.read_only {
        flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
    } else {
        flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
        if !config.open.must_exist {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
    }

    let conn = if config.is_memory() {
        Connection::open_in_memory_with_flags(flags)?
    } else {
        Connection::open_with_flags(&config.path, flags)?
    };
    conn.busy_timeout(config.open.busy_timeout())?;
    let journal_mode = apply_pragmas(&conn, &config.pragmas, config.open.read_only)?;
    Ok((conn, journal_mode))
}

/// Apply durability and performance pragmas, returning the effective journal mode.
///
/// # Errors
/// Returns `StoreError::Sqlite` if any PRAGMA statement fails.
pub fn apply_pragmas(
    conn: &Connection,
    pragmas: &PragmaSettings,
    read_only: bool,
) -> Result<String, StoreError> {
    // journal_mode answers with a row, so it cannot go through execute_batch
    let journal_mode: String = if pragmas.journal_wal && !read_only {
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?
    } else {
        conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?
    };

    let mut batch = format!(
        "PRAGMA synchronous = {};\nPRAGMA cache_size = -{};\n",
        pragmas.synchronous.as_pragma(),
        pragmas.cache_size_kib
    );
    if pragmas.temp_store_memory {
        batch.push_str("PRAGMA temp_store = MEMORY;\n");
    }
    if pragmas.foreign_keys {
        batch.push_str("PRAGMA foreign_keys = ON;\n");
    }
    conn.execute_batch(&batch)?;

    Ok(journal_mode.to_lowercase())
}
