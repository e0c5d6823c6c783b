//! Validated runtime configuration assembled from the environment and the [Cli].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use derive_more::{Display, Error};

use crate::cli::Cli;
use crate::util::retention::RetentionPolicy;

pub const DB_CONTAINER_NAME: &str = "DB_CONTAINER_NAME";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const SUPABASE_URL: &str = "SUPABASE_URL";
pub const SUPABASE_KEY: &str = "SUPABASE_KEY";
pub const SUPABASE_BUCKET: &str = "SUPABASE_BUCKET";

/// Environment variables that have to be set to a non-empty value.
pub const REQUIRED_KEYS: [&str; 7] = [
    DB_CONTAINER_NAME,
    DB_NAME,
    DB_USER,
    DB_PASSWORD,
    SUPABASE_URL,
    SUPABASE_KEY,
    SUPABASE_BUCKET,
];

#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variables are unset or empty.
    #[display("missing required environment variable(s): {}", _0.join(", "))]
    Missing(#[error(ignore)] Vec<&'static str>),
}

/// Connection details of the containerized database.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub container: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Binary of the container runtime, e.g. `docker` or `podman`.
    pub runtime: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("container", &self.container)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("runtime", &self.runtime)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub url: String,
    pub key: String,
    pub bucket: String,
    /// Limit for a whole upload request, [None] waits indefinitely.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url)
            .field("key", &"***")
            .field("bucket", &self.bucket)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub backup_dir: PathBuf,
    pub retention_dir: PathBuf,
    pub retention: RetentionPolicy,
    pub compress: bool,
}

impl Config {
    /// Reads the required values from the process environment.
    pub fn from_env(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), cli)
    }

    /// Builds the configuration using `lookup` to resolve required values.
    ///
    /// Every missing or empty key is reported at once.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        cli: &Cli,
    ) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let values = REQUIRED_KEYS.map(|key| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(key);
                String::new()
            }
        });

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        // same order as REQUIRED_KEYS
        let [container, name, user, password, url, key, bucket] = values;

        let database = DatabaseConfig {
            container,
            name,
            user,
            password,
            host: cli.db_host.clone(),
            port: cli.db_port,
            runtime: cli.container_runtime.clone(),
        };
        let storage = StorageConfig {
            url,
            key,
            bucket,
            timeout: cli.upload_timeout.map(Duration::from_secs),
        };

        let retention_dir = cli
            .retention_dir
            .clone()
            .unwrap_or_else(|| cli.backup_dir.clone());
        let retention = RetentionPolicy {
            max_age_days: cli.retention_days,
            on_error: cli.retention_on_error,
        };

        let config = Self {
            database,
            storage,
            backup_dir: cli.backup_dir.clone(),
            retention_dir,
            retention,
            compress: cli.compress,
        };
        log::debug!(target: "config", "Loaded configuration: {config:?}");

        Ok(config)
    }
}
