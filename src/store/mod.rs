//! Remote object storage for published builds.
//!
//! The pipeline only needs a flat bucket: existence checks, public writes and
//! a full listing. Three backends implement [`ObjectStore`]:
//!
//! - [`HttpObjectStore`] - S3-style REST endpoint over `reqwest`
//! - [`FsObjectStore`] - a directory served by a static web host
//! - [`MemoryObjectStore`] - in-process map, used by tests and dry runs

mod fs;
mod http;
mod memory;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;
pub use memory::{MemoryObjectStore, StoredObject};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by object store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with an unexpected status
    #[error("{method} {key} returned {status}: {body}")]
    Status {
        /// HTTP method used
        method: String,
        /// Object key (or container name)
        key: String,
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Filesystem backend failure
    #[error("{context} {key}: {error}")]
    Io {
        /// What was being attempted
        context: String,
        /// Object key
        key: String,
        /// Underlying IO error
        #[source]
        error: std::io::Error,
    },

    /// Key is not a plain object name
    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    /// Write rejected by the backend
    #[error("write to {key} rejected: {reason}")]
    Rejected {
        /// Object key
        key: String,
        /// Reason for the error
        reason: String,
    },
}

/// Read visibility applied to a written object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only credentialed clients can read
    Private,
    /// Anyone with the URL can read
    PublicRead,
}

/// Flat key/value blob store with public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket (or directory) name, for messages.
    fn container_name(&self) -> &str;

    /// Whether the bucket itself exists.
    async fn container_exists(&self) -> StoreResult<bool>;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Write `body` under `key`, replacing any previous object.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StoreResult<()>;

    /// Every key in the bucket, in the backend's listing order.
    async fn list_keys(&self) -> StoreResult<Vec<String>>;

    /// Public URL an install client can fetch `key` from.
    fn public_url(&self, key: &str) -> String;
}

/// Keys are flat object names; anything path-like is refused.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.chars().any(char::is_control);
    if invalid {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_must_be_flat_names() {
        assert!(validate_key("com.app.foo-2.3.5.plist").is_ok());
        assert!(validate_key("index.html").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("nested/key.plist").is_err());
        assert!(validate_key("bad\nkey").is_err());
    }
}
