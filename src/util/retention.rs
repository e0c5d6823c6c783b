//! Age based retention of local backup files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use clap::ValueEnum;
use derive_more::{Display, Error};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Default number of days a backup is kept.
pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

/// Reaction to an entry that can't be inspected or deleted.
#[derive(Copy, Clone, ValueEnum, Debug, Display, Default, PartialEq, Eq)]
pub enum OnError {
    /// Log a warning and continue with the next entry.
    #[default]
    #[display("skip")]
    Skip,
    /// Stop pruning and report the error.
    #[display("abort")]
    Abort,
}

/// Configure retention of backup files.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Files whose age in whole days is *strictly* greater are deleted.
    pub max_age_days: u64,

    pub on_error: OnError,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            on_error: OnError::default(),
        }
    }
}

impl RetentionPolicy {
    /// Returns if a file last modified at `modified` is to be retained at `now`.
    pub fn retain(&self, modified: SystemTime, now: SystemTime) -> bool {
        age_in_days(modified, now) <= self.max_age_days
    }
}

/// Whole days elapsed between `modified` and `now`.
///
/// Timestamps in the future have an age of zero.
pub fn age_in_days(modified: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(modified)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        / SECONDS_PER_DAY
}

#[derive(Debug, Display, Error)]
pub enum RetentionError {
    /// The backup directory can't be listed.
    #[display("Unable to read directory {}: {source}", dir.display())]
    ReadDir { dir: PathBuf, source: io::Error },
    /// An entry of the backup directory can't be read.
    #[display("Unable to read entry of {}: {source}", dir.display())]
    Entry { dir: PathBuf, source: io::Error },
    /// Metadata of a file can't be obtained.
    #[display("Unable to inspect {}: {source}", path.display())]
    Metadata { path: PathBuf, source: io::Error },
    /// An expired file can't be deleted.
    #[display("Unable to delete {}: {source}", path.display())]
    Delete { path: PathBuf, source: io::Error },
}

/// Deletes every regular file in `dir` that is older than the policy allows.
///
/// Returns the deleted files. Sub-directories and special files are left
/// alone. Per-entry failures are handled according to [RetentionPolicy::on_error],
/// failing to list `dir` itself is always an error.
pub fn prune(
    dir: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
) -> Result<Vec<PathBuf>, RetentionError> {
    prune_with(dir, policy, now, |path| fs::remove_file(path))
}

/// Like [prune], but expired files are deleted with `remove`.
///
/// Entries are visited in file name order.
pub fn prune_with(
    dir: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
    remove: impl Fn(&Path) -> io::Result<()>,
) -> Result<Vec<PathBuf>, RetentionError> {
    log::debug!(target: "retention", "Pruning files older than {} days in {}", policy.max_age_days, dir.display());

    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|source| RetentionError::ReadDir {
            dir: dir.to_path_buf(),
            source,
        })?
        .collect();
    entries.sort_by_key(|entry| entry.as_ref().ok().map(fs::DirEntry::file_name));

    let mut deleted = Vec::new();
    for entry in entries {
        match prune_entry(dir, entry, policy, now, &remove) {
            Ok(Some(path)) => {
                log::info!(target: "retention", "Deleted old backup: {}", path.display());
                deleted.push(path);
            }
            Ok(None) => {}
            Err(e) => match policy.on_error {
                OnError::Abort => return Err(e),
                OnError::Skip => log::warn!(target: "retention", "Skipping entry: {e}"),
            },
        }
    }

    Ok(deleted)
}

fn prune_entry(
    dir: &Path,
    entry: io::Result<fs::DirEntry>,
    policy: &RetentionPolicy,
    now: SystemTime,
    remove: &impl Fn(&Path) -> io::Result<()>,
) -> Result<Option<PathBuf>, RetentionError> {
    let entry = entry.map_err(|source| RetentionError::Entry {
        dir: dir.to_path_buf(),
        source,
    })?;
    let path = entry.path();

    // follows symlinks, a link to a regular file counts as a file
    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        // dangling symlink or removed concurrently
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(RetentionError::Metadata { path, source }),
    };
    if !metadata.is_file() {
        log::trace!(target: "retention", "Ignoring non-file entry {}", path.display());
        return Ok(None);
    }

    let modified = match metadata.modified() {
        Ok(modified) => modified,
        Err(source) => return Err(RetentionError::Metadata { path, source }),
    };
    if policy.retain(modified, now) {
        log::trace!(target: "retention", "Keeping {} ({} days old)", path.display(), age_in_days(modified, now));
        return Ok(None);
    }

    match remove(&path) {
        Ok(()) => Ok(Some(path)),
        Err(source) => Err(RetentionError::Delete { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::*;

    const DAY: Duration = Duration::from_secs(SECONDS_PER_DAY);

    fn file_aged(dir: &Path, name: &str, now: SystemTime, age: Duration) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(now - age).unwrap();
        path
    }

    #[test]
    fn age_is_counted_in_whole_days() {
        let now = SystemTime::now();

        assert_eq!(age_in_days(now, now), 0);
        assert_eq!(age_in_days(now - DAY + Duration::from_secs(1), now), 0);
        assert_eq!(age_in_days(now - DAY, now), 1);
        assert_eq!(age_in_days(now - 8 * DAY - Duration::from_secs(60), now), 8);
        assert_eq!(age_in_days(now + DAY, now), 0);
    }

    #[test]
    fn threshold_is_exclusive() {
        let now = SystemTime::now();
        let policy = RetentionPolicy::default();

        assert!(policy.retain(now - 7 * DAY, now));
        assert!(policy.retain(now - 8 * DAY + Duration::from_secs(1), now));
        assert!(!policy.retain(now - 8 * DAY, now));
    }

    #[test]
    fn prunes_only_expired_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();

        let fresh = file_aged(dir.path(), "db_backup_fresh.sql", now, Duration::ZERO);
        let at_threshold = file_aged(dir.path(), "db_backup_week.sql", now, 7 * DAY + Duration::from_secs(60));
        let expired = file_aged(dir.path(), "db_backup_old.sql", now, 8 * DAY + Duration::from_secs(60));
        let very_old = file_aged(dir.path(), "notes.txt", now, 400 * DAY);
        let sub_dir = dir.path().join("nested");
        fs::create_dir(&sub_dir).unwrap();
        file_aged(&sub_dir, "db_backup_nested.sql", now, 30 * DAY);

        let mut deleted = prune(dir.path(), &RetentionPolicy::default(), now).unwrap();
        deleted.sort();

        let mut expected = vec![expired, very_old];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(fresh.exists());
        assert!(at_threshold.exists());
        assert!(sub_dir.join("db_backup_nested.sql").exists());
    }

    #[test]
    fn custom_threshold_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let two_days = file_aged(dir.path(), "a.sql", now, 2 * DAY + Duration::from_secs(5));
        let one_day = file_aged(dir.path(), "b.sql", now, DAY + Duration::from_secs(5));
        let policy = RetentionPolicy {
            max_age_days: 1,
            ..Default::default()
        };

        let deleted = prune(dir.path(), &policy, now).unwrap();

        assert_eq!(deleted, vec![two_days]);
        assert!(one_day.exists());
    }

    fn remove_except(locked: PathBuf) -> impl Fn(&Path) -> io::Result<()> {
        move |path| {
            if path == locked {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            } else {
                fs::remove_file(path)
            }
        }
    }

    #[test]
    fn skip_policy_continues_after_failed_delete() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let a = file_aged(dir.path(), "a.sql", now, 10 * DAY);
        let b = file_aged(dir.path(), "b.sql", now, 10 * DAY);
        let c = file_aged(dir.path(), "c.sql", now, 10 * DAY);
        let policy = RetentionPolicy {
            on_error: OnError::Skip,
            ..Default::default()
        };

        let deleted = prune_with(dir.path(), &policy, now, remove_except(b.clone())).unwrap();

        assert_eq!(deleted, vec![a.clone(), c.clone()]);
        assert!(!a.exists());
        assert!(b.exists());
        assert!(!c.exists());
    }

    #[test]
    fn abort_policy_stops_at_failed_delete() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let a = file_aged(dir.path(), "a.sql", now, 10 * DAY);
        let b = file_aged(dir.path(), "b.sql", now, 10 * DAY);
        let c = file_aged(dir.path(), "c.sql", now, 10 * DAY);
        let policy = RetentionPolicy {
            on_error: OnError::Abort,
            ..Default::default()
        };

        let err = prune_with(dir.path(), &policy, now, remove_except(b.clone())).unwrap_err();

        assert!(matches!(err, RetentionError::Delete { ref path, .. } if *path == b));
        assert!(!a.exists());
        assert!(b.exists());
        assert!(c.exists());
    }

    #[test]
    fn missing_directory_is_an_error_regardless_of_policy() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        for on_error in [OnError::Skip, OnError::Abort] {
            let policy = RetentionPolicy {
                on_error,
                ..Default::default()
            };
            let err = prune(&missing, &policy, SystemTime::now()).unwrap_err();
            assert!(matches!(err, RetentionError::ReadDir { .. }));
        }
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlinks_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling.sql");
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &link).unwrap();

        let deleted = prune(dir.path(), &RetentionPolicy::default(), SystemTime::now()).unwrap();

        assert!(deleted.is_empty());
        assert!(link.symlink_metadata().is_ok());
    }
}
