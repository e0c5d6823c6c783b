//! One backup run: dump, upload and prune.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use derive_more::{Display, Error, From};

use crate::backends::{Backup, PgDump};
use crate::command::CommandRunner;
use crate::config::Config;
use crate::storage::{self, ObjectStore};
use crate::util::retention::{self, RetentionError, RetentionPolicy};

/// Errors that end a run early.
#[derive(Debug, Display, Error, From)]
pub enum PipelineError {
    /// Pruning old backups was aborted.
    #[display("Retention of old backups aborted: {_0}")]
    Retention(RetentionError),
}

/// Outcome of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// The new dump, [None] if dumping failed.
    pub artifact: Option<PathBuf>,
    /// Key of the remote object, [None] if nothing was uploaded.
    pub uploaded: Option<String>,
    /// Files removed by the retention stage.
    pub deleted: Vec<PathBuf>,
}

impl RunReport {
    /// Whether the dump was created and uploaded.
    pub fn success(&self) -> bool {
        self.artifact.is_some() && self.uploaded.is_some()
    }
}

/// Runs the backup pipeline once.
///
/// A failed dump skips all following stages, a failed upload does not keep
/// old backups from being pruned. Only an aborted retention is returned as
/// an error.
pub fn run(
    config: &Config,
    runner: &dyn CommandRunner,
    store: &dyn ObjectStore,
) -> Result<RunReport, PipelineError> {
    let mut report = RunReport::default();

    let dump = PgDump::from_config(config);
    let Some(artifact) = dump_stage(&dump, runner, &config.backup_dir) else {
        log::warn!(target: "pipeline", "Skipping upload and retention because the dump failed");
        return Ok(report);
    };

    report.uploaded = upload_stage(store, &artifact);
    report.artifact = Some(artifact);

    report.deleted = retention_stage(&config.retention_dir, &config.retention)?;

    Ok(report)
}

/// Dumps the database, logging and swallowing any failure.
pub fn dump_stage<B>(backend: &B, runner: &dyn CommandRunner, backup_dir: &Path) -> Option<PathBuf>
where
    B: Backup,
    B::Error: fmt::Display,
{
    match backend.backup(runner, backup_dir, Local::now()) {
        Ok(path) => Some(path),
        Err(e) => {
            log::error!(target: "pipeline", "Error during database backup: {e}");
            None
        }
    }
}

/// Uploads the artifact, logging and swallowing any failure.
pub fn upload_stage(store: &dyn ObjectStore, artifact: &Path) -> Option<String> {
    match storage::upload_file(store, artifact) {
        Ok(key) => {
            log::info!(target: "pipeline", "File uploaded to {}", store.location(&key));
            Some(key)
        }
        Err(e) => {
            log::error!(target: "pipeline", "Error uploading backup: {e}");
            None
        }
    }
}

/// Prunes old backups according to `policy`.
pub fn retention_stage(
    dir: &Path,
    policy: &RetentionPolicy,
) -> Result<Vec<PathBuf>, RetentionError> {
    let deleted = retention::prune(dir, policy, SystemTime::now())?;
    log::info!(target: "pipeline", "Retention removed {} old backup(s) from {}", deleted.len(), dir.display());
    Ok(deleted)
}
