//! Implements dumps of a containerized PostgreSQL database using [PgDump].

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use derive_more::{Display, Error};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::backends::Backup;
use crate::command::{CommandRunner, Finished, Invocation};
use crate::config::{Config, DatabaseConfig};

const ARTIFACT_PREFIX: &str = "db_backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const PASSWORD_ENV: &str = "PGPASSWORD";
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Display, Error)]
pub enum DumpError {
    /// The destination folder can't be created.
    #[display("Unable to create backup folder {}: {source}", dir.display())]
    CreateDir { dir: PathBuf, source: io::Error },
    /// No new artifact file could be created.
    #[display("Unable to create backup file in {}: {source}", dir.display())]
    CreateFile { dir: PathBuf, source: io::Error },
    /// The dump command could not be launched or its output not be transferred.
    #[display("Running {program} failed: {source}")]
    Run { program: String, source: io::Error },
    /// Finishing the artifact file failed.
    #[display("Writing backup file failed: {_0}")]
    Write(io::Error),
    /// The dump command terminated unsuccessfully.
    #[display("{program} failed with {status}")]
    Failed { program: String, status: Finished },
}

/// `pg_dump` executed inside the database container.
///
/// The password is handed to the container runtime through its environment
/// and forwarded with `-e PGPASSWORD`, so it never shows up in a process
/// listing.
#[derive(Debug, Clone)]
pub struct PgDump {
    database: DatabaseConfig,
    compress: bool,
}

impl PgDump {
    pub fn new(database: DatabaseConfig) -> Self {
        Self {
            database,
            compress: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.database.clone()).compressed(config.compress)
    }

    /// Gzip the dump stream.
    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// The command producing the dump on its stdout.
    pub fn invocation(&self) -> Invocation {
        let db = &self.database;
        Invocation::new(&db.runtime)
            .arg("exec")
            .arg("-e")
            .arg(PASSWORD_ENV)
            .arg(&db.container)
            .arg("pg_dump")
            .arg("-U")
            .arg(&db.user)
            .arg("-h")
            .arg(&db.host)
            .arg("-p")
            .arg(db.port.to_string())
            .arg(&db.name)
            .env(PASSWORD_ENV, &db.password)
    }

    fn extension(&self) -> &'static str {
        if self.compress {
            "sql.gz"
        } else {
            "sql"
        }
    }

    fn dump_into(&self, runner: &dyn CommandRunner, file: File) -> Result<(), DumpError> {
        let invocation = self.invocation();
        let program = invocation.program().to_string();
        let run_failed = |source| DumpError::Run {
            program: program.clone(),
            source,
        };

        let mut writer = BufWriter::new(file);
        let finished = if self.compress {
            let mut encoder = GzEncoder::new(&mut writer, Compression::default());
            let finished = runner.run(&invocation, &mut encoder).map_err(run_failed)?;
            encoder.finish().map_err(DumpError::Write)?;
            finished
        } else {
            runner.run(&invocation, &mut writer).map_err(run_failed)?
        };
        writer.flush().map_err(DumpError::Write)?;

        if !finished.success() {
            return Err(DumpError::Failed {
                program,
                status: finished,
            });
        }

        Ok(())
    }
}

impl Backup for PgDump {
    type Error = DumpError;

    fn backup(
        &self,
        runner: &dyn CommandRunner,
        dest_dir: &Path,
        now: DateTime<Local>,
    ) -> Result<PathBuf, Self::Error> {
        let db = &self.database;
        log::info!(target: "backend::postgres", "Create database dump of {} in container {}", db.name, db.container);
        log::trace!(target: "backend::postgres", "Using dbuser '{}' at {}:{}", db.user, db.host, db.port);

        fs::create_dir_all(dest_dir).map_err(|source| DumpError::CreateDir {
            dir: dest_dir.to_path_buf(),
            source,
        })?;
        if dest_dir.is_relative() {
            log::warn!(target: "backend::postgres", "Backup folder is relative: {}", dest_dir.display());
        }

        let (path, file) = create_artifact(dest_dir, now, self.extension()).map_err(|source| {
            DumpError::CreateFile {
                dir: dest_dir.to_path_buf(),
                source,
            }
        })?;
        log::debug!(target: "backend::postgres", "Save database dump at: {}", path.display());

        if let Err(e) = self.dump_into(runner, file) {
            if let Err(rm) = fs::remove_file(&path) {
                log::warn!(target: "backend::postgres", "Unable to remove incomplete dump {}: {rm}", path.display());
            }
            return Err(e);
        }

        log::info!(target: "backend::postgres", "Database backup successful: {}", path.display());
        Ok(path)
    }
}

/// Creates a new, previously non-existent artifact file named after `now`.
///
/// If the plain name is already taken a counter is appended, e.g.
/// `db_backup_20240131_235959_1.sql`.
fn create_artifact(
    dest_dir: &Path,
    now: DateTime<Local>,
    extension: &str,
) -> io::Result<(PathBuf, File)> {
    let timestamp = now.format(TIMESTAMP_FORMAT);

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{ARTIFACT_PREFIX}{timestamp}.{extension}")
        } else {
            format!("{ARTIFACT_PREFIX}{timestamp}_{attempt}.{extension}")
        };
        let path = dest_dir.join(name);

        match File::create_new(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::trace!(target: "backend::postgres", "{} already exists", path.display());
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for timestamp {timestamp}"),
    ))
}
