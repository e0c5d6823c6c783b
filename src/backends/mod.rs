//! Backend modules producing local database dumps.
//!
//! Currently the following backends are implemented:
//!
//! - [PgDump]: `pg_dump` executed inside the PostgreSQL container.

pub mod postgres;

pub use postgres::{DumpError, PgDump};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::command::CommandRunner;

/// Generic backup backend.
pub trait Backup {
    /// Error that may happen on backup.
    type Error;

    /// Writes a new backup artifact into `dest_dir` and returns its path.
    ///
    /// `now` is the moment embedded into the name of the artifact.
    fn backup(
        &self,
        runner: &dyn CommandRunner,
        dest_dir: &Path,
        now: DateTime<Local>,
    ) -> Result<PathBuf, Self::Error>;
}
