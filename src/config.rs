use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

static PLAIN_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

pub const MEMORY_PATH: &str = ":memory:";

/// Largest busy timeout `SQLite` accepts, in milliseconds.
pub const MAX_BUSY_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Everything a [`StoreManager`](crate::StoreManager) needs to open and maintain a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub open: OpenOptions,
    pub pragmas: PragmaSettings,
    pub migrations: MigrationSettings,
    pub backup: BackupSettings,
    /// Buffered events per subscriber before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            open: OpenOptions::default(),
            pragmas: PragmaSettings::default(),
            migrations: MigrationSettings::default(),
            backup: BackupSettings::default(),
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    pub read_only: bool,
    /// Refuse to create the store file when it does not exist yet.
    pub must_exist: bool,
    pub busy_timeout_ms: u64,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            must_exist: false,
            busy_timeout_ms: 5_000,
        }
    }
}

impl OpenOptions {
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// `PRAGMA synchronous` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    #[must_use]
    pub fn as_pragma(self) -> &'static str {
        match self {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
            SynchronousMode::Extra => "EXTRA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PragmaSettings {
    pub journal_wal: bool,
    pub synchronous: SynchronousMode,
    /// Page cache bound in KiB (applied as a negative `cache_size`).
    pub cache_size_kib: u32,
    pub temp_store_memory: bool,
    pub foreign_keys: bool,
}

impl Default for PragmaSettings {
    fn default() -> Self {
        Self {
            journal_wal: true,
            synchronous: SynchronousMode::Normal,
            cache_size_kib: 64 * 1024,
            temp_store_memory: true,
            foreign_keys: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Bookkeeping table holding applied versions.
    pub table: String,
    /// Where the host loads migration files from; informational only.
    pub source_dir: Option<PathBuf>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            table: "_migrations".to_string(),
            source_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Run the periodic backup timer while connected.
    pub enabled: bool,
    /// Defaults to `<store dir>/backups`.
    pub directory: Option<PathBuf>,
    pub interval_secs: u64,
    /// Backups kept after pruning; `0` keeps everything.
    pub max_backups: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            interval_secs: 60 * 60,
            max_backups: 10,
        }
    }
}

impl BackupSettings {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder(path: impl Into<PathBuf>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(path)
    }

    /// Parse a JSON document; omitted sections take their defaults.
    ///
    /// # Errors
    /// Returns `StoreError::Configuration` when the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|e| StoreError::Configuration(format!("invalid config document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Directory that receives snapshots.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        if let Some(dir) = &self.backup.directory {
            return dir.clone();
        }
        let parent = if self.is_memory() {
            None
        } else {
            self.path.parent().filter(|p| !p.as_os_str().is_empty())
        };
        parent.unwrap_or_else(|| Path::new(".")).join("backups")
    }

    /// Check the configuration before any file is touched.
    ///
    /// # Errors
    /// Returns `StoreError::Configuration` describing the first invalid setting.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::Configuration("store path is empty".into()));
        }
        if !self.is_memory() && self.path.is_dir() {
            return Err(StoreError::Configuration(format!(
                "store path {} is a directory",
                self.path.display()
            )));
        }
        if self.open.read_only && self.is_memory() {
            return Err(StoreError::Configuration(
                "an in-memory store cannot be opened read-only".into(),
            ));
        }
        if self.open.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(StoreError::Configuration(format!(
                "busy timeout of {} ms exceeds the {MAX_BUSY_TIMEOUT_MS} ms limit",
                self.open.busy_timeout_ms
            )));
        }
        if !PLAIN_IDENTIFIER.is_match(&self.migrations.table) {
            return Err(StoreError::Configuration(format!(
                "migration table name {:?} must be a plain identifier",
                self.migrations.table
            )));
        }
        if self.backup.enabled && self.backup.interval_secs == 0 {
            return Err(StoreError::Configuration(
                "backup interval must be at least one second".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(StoreError::Configuration(
                "event capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            config: StoreConfig::new(path),
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.open.read_only = read_only;
        self
    }

    #[must_use]
    pub fn must_exist(mut self, must_exist: bool) -> Self {
        self.config.open.must_exist = must_exist;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.open.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn pragmas(mut self, pragmas: PragmaSettings) -> Self {
        self.config.pragmas = pragmas;
        self
    }

    #[must_use]
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.config.pragmas.synchronous = mode;
        self
    }

    #[must_use]
    pub fn migration_table(mut self, table: impl Into<String>) -> Self {
        self.config.migrations.table = table.into();
        self
    }

    #[must_use]
    pub fn migration_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.migrations.source_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn backups(mut self, settings: BackupSettings) -> Self {
        self.config.backup = settings;
        self
    }

    #[must_use]
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.backup.directory = Some(dir.into());
        self
    }

    #[must_use]
    pub fn backup_schedule(mut self, interval: Duration, max_backups: usize) -> Self {
        self.config.backup.enabled = true;
        self.config.backup.interval_secs = interval.as_secs();
        self.config.backup.max_backups = max_backups;
        self
    }

    #[must_use]
    pub fn max_backups(mut self, max_backups: usize) -> Self {
        self.config.backup.max_backups = max_backups;
        self
    }

    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Validate and return the finished configuration.
    ///
    /// # Errors
    /// Returns `StoreError::Configuration` if any setting is invalid.
    pub fn build(self) -> Result<StoreConfig, StoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sections_default_when_omitted() {
        let config = StoreConfig::from_json_str(
            r#"{ "path": "data/app.db", "backup": { "enabled": true, "max_backups": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("data/app.db"));
        assert!(config.backup.enabled);
        assert_eq!(config.backup.max_backups, 3);
        assert_eq!(config.backup.interval_secs, 3600);
        assert_eq!(config.migrations.table, "_migrations");
        assert_eq!(config.pragmas.synchronous, SynchronousMode::Normal);
        assert_eq!(config.backup_dir(), PathBuf::from("data/backups"));
    }

    #[test]
    fn rejects_unsafe_migration_table() {
        let err = StoreConfig::builder("app.db")
            .migration_table("applied; DROP TABLE x")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn rejects_zero_interval_schedule() {
        let err = StoreConfig::builder("app.db")
            .backup_schedule(Duration::from_millis(10), 3)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn rejects_busy_timeout_beyond_sqlite_limit() {
        let err = StoreConfig::builder("app.db")
            .busy_timeout(Duration::from_secs(10_000_000))
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));

        let err = StoreConfig::from_json_str(r#"{ "open": { "busy_timeout_ms": 4000000000 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("busy timeout"));

        let config = StoreConfig::builder("app.db")
            .busy_timeout(Duration::from_millis(MAX_BUSY_TIMEOUT_MS))
            .build()
            .unwrap();
        assert_eq!(config.open.busy_timeout_ms, MAX_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn memory_store_backups_default_to_cwd() {
        let config = StoreConfig::default();
        assert!(config.is_memory());
        assert_eq!(config.backup_dir(), PathBuf::from("./backups"));
    }
}
