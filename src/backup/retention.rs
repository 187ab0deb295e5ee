use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;

static BACKUP_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^backup_.*\.db$").expect("backup file pattern"));

/// Files removed by a pruning pass, plus the ones that could not be removed.
#[derive(Debug, Default)]
pub(crate) struct PruneOutcome {
    pub(crate) removed: Vec<PathBuf>,
    pub(crate) failed: Vec<(PathBuf, io::Error)>,
}

/// Keep the `max_backups` most recently modified backups in `dir`; `0` keeps all.
pub(crate) fn prune(dir: &Path, max_backups: usize) -> io::Result<PruneOutcome> {
    let mut outcome = PruneOutcome::default();
    if max_backups == 0 {
        return Ok(outcome);
    }

    let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !BACKUP_FILE.is_match(file_name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        backups.push((metadata.modified()?, entry.path()));
    }

    backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    for (_, path) in backups.into_iter().skip(max_backups) {
        match fs::remove_file(&path) {
            Ok(()) => outcome.removed.push(path),
            Err(err) => outcome.failed.push((path, err)),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use super::*;

    fn backup_aged(dir: &Path, name: &str, age_secs: u64) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn keeps_most_recent_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        // names deliberately out of mtime order
        backup_aged(dir.path(), "backup_001.db", 10);
        backup_aged(dir.path(), "backup_002.db", 500);
        backup_aged(dir.path(), "backup_003.db", 20);
        backup_aged(dir.path(), "backup_004.db", 400);
        backup_aged(dir.path(), "backup_005.db", 30);
        backup_aged(dir.path(), "notes.txt", 9_000);

        let outcome = prune(dir.path(), 3).unwrap();
        assert_eq!(outcome.removed.len(), 2);
        assert!(outcome.failed.is_empty());

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec!["backup_001.db", "backup_003.db", "backup_005.db", "notes.txt"]
        );
    }

    #[test]
    fn zero_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        backup_aged(dir.path(), "backup_001.db", 10);
        backup_aged(dir.path(), "backup_002.db", 20);
        let outcome = prune(dir.path(), 0).unwrap();
        assert!(outcome.removed.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
