use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::util::retention::OnError;

/// Dump a containerized PostgreSQL database, upload the dump to Supabase Storage
/// and prune old local dumps.
///
/// Credentials are only read from the environment (or a `.env` file):
/// `DB_CONTAINER_NAME`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`, `SUPABASE_URL`,
/// `SUPABASE_KEY` and `SUPABASE_BUCKET`.
///
/// The exit status is non-zero if the dump or the upload failed, or if
/// pruning was aborted. Old dumps are still pruned after a failed upload,
/// so a failed run doesn't mean retention was skipped.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Folder the database dumps are written to.
    #[arg(long, env = "BACKUP_DIR", default_value = "backups")]
    pub backup_dir: PathBuf,

    /// Folder to prune old dumps from. Defaults to the backup folder.
    #[arg(long, env = "RETENTION_DIR")]
    pub retention_dir: Option<PathBuf>,

    /// Days of local dumps to keep.
    #[arg(long, env = "RETENTION_DAYS", default_value = "7")]
    pub retention_days: u64,

    /// What to do if a file can't be inspected or deleted while pruning.
    #[arg(long, env = "RETENTION_ON_ERROR", default_value = "skip")]
    pub retention_on_error: OnError,

    /// Host pg_dump connects to from inside the container.
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// Port pg_dump connects to from inside the container.
    #[arg(long, env = "DB_PORT", default_value = "5432")]
    pub db_port: u16,

    /// Container runtime used to execute pg_dump inside the database container.
    #[arg(long, env = "CONTAINER_RUNTIME", default_value = "docker")]
    pub container_runtime: String,

    /// Gzip the database dump.
    #[arg(long, env = "BACKUP_COMPRESS")]
    pub compress: bool,

    /// Seconds an upload may take before it is cancelled. Unlimited by default.
    #[arg(long, env = "UPLOAD_TIMEOUT_SECS")]
    pub upload_timeout: Option<u64>,
}
