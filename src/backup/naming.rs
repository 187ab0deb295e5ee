use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Local, Utc};
use regex::Regex;

use crate::error::StoreError;

use super::BackupName;

static INCREMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^backup_(\d{3,9})\.db$").expect("increment pattern"));

const EXTENSION: &str = ".db";

/// Pick a filename in `dir` for `name` that no existing backup uses.
pub(crate) fn resolve_filename(
    dir: &Path,
    name: &BackupName,
    now: DateTime<Utc>,
) -> Result<String, StoreError> {
    let base = match name {
        BackupName::Timestamp => format!("backup_{}{EXTENSION}", now.timestamp_millis()),
        BackupName::DateTime => now
            .with_timezone(&Local)
            .format("backup_%Y-%m-%d_%H-%M-%S.db")
            .to_string(),
        BackupName::Increment => format!("backup_{:03}{EXTENSION}", next_increment(dir)?),
        BackupName::Custom(custom) => custom_filename(custom)?,
    };
    Ok(avoid_collision(dir, &base))
}

fn next_increment(dir: &Path) -> Result<u64, StoreError> {
    if !dir.exists() {
        return Ok(1);
    }
    let mut highest = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(caps) = INCREMENT_NAME.captures(file_name)
            && let Ok(n) = caps[1].parse::<u64>()
        {
            highest = highest.max(n);
        }
    }
    Ok(highest + 1)
}

fn custom_filename(custom: &str) -> Result<String, StoreError> {
    let trimmed = custom.trim();
    if trimmed.is_empty() || trimmed == EXTENSION {
        return Err(StoreError::Backup("custom backup name is empty".into()));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(StoreError::Backup(format!(
            "custom backup name {trimmed:?} must be a bare file name"
        )));
    }
    if trimmed.ends_with(EXTENSION) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}{EXTENSION}"))
    }
}

/// Append `_1`, `_2`, ... before the extension until the name is free.
fn avoid_collision(dir: &Path, base: &str) -> String {
    if !taken(dir, base) {
        return base.to_string();
    }
    let stem = base.strip_suffix(EXTENSION).unwrap_or(base);
    let mut n = 1u32;
    loop {
        let candidate = format!("{stem}_{n}{EXTENSION}");
        if !taken(dir, &candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn taken(dir: &Path, file_name: &str) -> bool {
    dir.join(file_name).exists() || dir.join(format!("{file_name}.tmp")).exists()
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use chrono::TimeZone;

    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn increment_continues_after_highest() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=9 {
            File::create(dir.path().join(format!("backup_{n:03}.db"))).unwrap();
        }
        let name = resolve_filename(dir.path(), &BackupName::Increment, Utc::now()).unwrap();
        assert_eq!(name, "backup_010.db");
    }

    #[test]
    fn increment_ignores_timestamp_names() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("backup_1700000000000.db")).unwrap();
        File::create(dir.path().join("backup_004.db")).unwrap();
        let name = resolve_filename(dir.path(), &BackupName::Increment, Utc::now()).unwrap();
        assert_eq!(name, "backup_005.db");
    }

    #[test]
    fn increment_starts_at_one_in_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-yet");
        let name = resolve_filename(&missing, &BackupName::Increment, Utc::now()).unwrap();
        assert_eq!(name, "backup_001.db");
    }

    #[test]
    fn timestamp_collisions_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let now = at(1_700_000_000_123);
        File::create(dir.path().join("backup_1700000000123.db")).unwrap();
        File::create(dir.path().join("backup_1700000000123_1.db")).unwrap();
        let name = resolve_filename(dir.path(), &BackupName::Timestamp, now).unwrap();
        assert_eq!(name, "backup_1700000000123_2.db");
    }

    #[test]
    fn custom_names_get_extension_and_reject_paths() {
        let dir = tempfile::tempdir().unwrap();
        let name =
            resolve_filename(dir.path(), &BackupName::Custom("before-upgrade".into()), Utc::now())
                .unwrap();
        assert_eq!(name, "before-upgrade.db");
        let err = resolve_filename(dir.path(), &BackupName::Custom("../escape".into()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Backup(_)));
    }

    #[test]
    fn datetime_names_follow_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let name = resolve_filename(dir.path(), &BackupName::DateTime, Utc::now()).unwrap();
        let pattern = Regex::new(r"^backup_\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}\.db$").unwrap();
        assert!(pattern.is_match(&name), "{name}");
    }
}
