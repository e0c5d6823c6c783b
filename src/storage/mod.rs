//! Remote object storage the backup artifacts are uploaded to.

pub mod supabase;

pub use supabase::SupabaseStorage;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};

/// Errors reported by an [ObjectStore].
#[derive(Debug, Display, Error, From)]
pub enum StorageError {
    /// The request didn't reach the service or the response couldn't be read.
    #[display("Request to object storage failed: {_0}")]
    #[from]
    Http(reqwest::Error),
    /// The service answered with an error status.
    #[display("Object storage rejected the upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// A bucket of a remote object storage service.
pub trait ObjectStore {
    /// Stores `body` under `key`.
    fn upload(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Human readable location of `key`, used for log messages.
    fn location(&self, key: &str) -> String;
}

/// Errors while uploading a local backup artifact.
#[derive(Debug, Display, Error)]
pub enum UploadError {
    /// The path has no usable file name to use as key.
    #[display("No file name in {}", _0.display())]
    NoFileName(#[error(ignore)] PathBuf),
    /// The local file can't be read.
    #[display("Unable to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The object store failed.
    #[display("Uploading {key} failed: {source}")]
    Store { key: String, source: StorageError },
}

/// Uploads the file at `path` under its base name and returns the key.
pub fn upload_file(store: &dyn ObjectStore, path: &Path) -> Result<String, UploadError> {
    let key = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| UploadError::NoFileName(path.to_path_buf()))?
        .to_string();

    let body = fs::read(path).map_err(|source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(target: "storage", "Uploading {} ({} bytes) to {}", path.display(), body.len(), store.location(&key));

    store
        .upload(&key, body)
        .map_err(|source| UploadError::Store {
            key: key.clone(),
            source,
        })?;

    Ok(key)
}
