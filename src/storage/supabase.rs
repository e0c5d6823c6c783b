//! [Supabase Storage](https://supabase.com/docs/guides/storage) bucket.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{ObjectStore, StorageError};
use crate::config::StorageConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the storage API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Uploads objects into a single bucket of a Supabase project.
pub struct SupabaseStorage {
    client: Client,
    url: String,
    key: String,
    bucket: String,
}

impl fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("url", &self.url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseStorage {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            // the blocking client limits whole requests to 30s otherwise
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            bucket: config.bucket.clone(),
        })
    }

    /// Endpoint an object named `key` is uploaded to.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{key}", self.url, self.bucket)
    }
}

impl ObjectStore for SupabaseStorage {
    fn upload(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let url = self.object_url(key);
        log::trace!(target: "storage::supabase", "POST {url}");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .body(body)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            log::debug!(target: "storage::supabase", "Upload of {key} answered with {status}: {text}");
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("{}/{key}", self.bucket)
    }
}

/// Extracts a readable message from an error response body.
fn error_message(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    match (parsed.error, parsed.message) {
        (Some(error), Some(message)) if error != message => format!("{error}: {message}"),
        (_, Some(message)) => message,
        (Some(error), None) => error,
        (None, None) if body.trim().is_empty() => "no details".to_string(),
        (None, None) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(url: &str) -> SupabaseStorage {
        SupabaseStorage::new(&StorageConfig {
            url: url.into(),
            key: "service-role-key".into(),
            bucket: "backups".into(),
            timeout: None,
        })
        .unwrap()
    }

    #[test]
    fn object_url_is_bucket_scoped() {
        let storage = storage("https://abc.supabase.co/");

        assert_eq!(
            storage.object_url("db_backup_20240301_123005.sql"),
            "https://abc.supabase.co/storage/v1/object/backups/db_backup_20240301_123005.sql"
        );
        assert_eq!(storage.location("a.sql"), "backups/a.sql");
    }

    #[test]
    fn debug_hides_key() {
        assert!(!format!("{:?}", storage("https://abc.supabase.co")).contains("service-role-key"));
    }

    #[test]
    fn error_messages_are_extracted() {
        assert_eq!(
            error_message(r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#),
            "Duplicate: The resource already exists"
        );
        assert_eq!(error_message(r#"{"message":"Invalid JWT"}"#), "Invalid JWT");
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(error_message(""), "no details");
    }

    #[test]
    fn upload_timeout_is_optional() {
        for timeout in [None, Some(Duration::from_secs(1))] {
            let storage = SupabaseStorage::new(&StorageConfig {
                url: "https://abc.supabase.co".into(),
                key: "key".into(),
                bucket: "backups".into(),
                timeout,
            });
            assert!(storage.is_ok());
        }
    }

    #[test]
    fn unreachable_service_is_an_http_error() {
        // nothing listens on the discard port
        let err = storage("http://127.0.0.1:9")
            .upload("a.sql", b"SELECT 1;".to_vec())
            .unwrap_err();

        assert!(matches!(err, StorageError::Http(_)));
    }
}
