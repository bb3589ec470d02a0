//! Directory-backed object store.
//!
//! Useful when the bucket is a web root on a static host (or a mounted
//! bucket). Objects are plain files named by their key.

use super::{ObjectStore, StoreError, StoreResult, Visibility, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;

/// Temp files start with this prefix and are hidden from listings.
const PARTIAL_PREFIX: &str = ".partial-";

/// [`ObjectStore`] over a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    name: String,
    root: PathBuf,
    base_url: String,
}

impl FsObjectStore {
    /// Store rooted at `root`, publicly reachable under `base_url`.
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self {
            name,
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn io_error(context: &str, key: &str, error: io::Error) -> StoreError {
        StoreError::Io {
            context: context.to_string(),
            key: key.to_string(),
            error,
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn container_name(&self) -> &str {
        &self.name
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error("inspecting", &self.name, e)),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        tokio::fs::try_exists(self.root.join(key))
            .await
            .map_err(|e| Self::io_error("checking", key, e))
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
        visibility: Visibility,
    ) -> StoreResult<()> {
        validate_key(key)?;
        let destination = self.root.join(key);
        let partial = self.root.join(format!("{}{}", PARTIAL_PREFIX, key));

        tokio::fs::write(&partial, &body)
            .await
            .map_err(|e| Self::io_error("writing", key, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match visibility {
                Visibility::PublicRead => 0o644,
                Visibility::Private => 0o600,
            };
            tokio::fs::set_permissions(&partial, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| Self::io_error("setting permissions on", key, e))?;
        }
        #[cfg(not(unix))]
        let _ = visibility;

        tokio::fs::rename(&partial, &destination)
            .await
            .map_err(|e| Self::io_error("publishing", key, e))?;

        log::debug!("Stored {} ({} bytes)", destination.display(), body.len());
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Self::io_error("listing", &self.name, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error("listing", &self.name, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && !name.starts_with(PARTIAL_PREFIX) {
                keys.push(name);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_list_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), "https://builds.example.com/");

        assert!(store.container_exists().await.unwrap());
        assert!(!store.exists("a-1.0.0.plist").await.unwrap());

        store
            .put("b-1.0.0.plist", Bytes::from_static(b"b"), "text/xml", Visibility::PublicRead)
            .await
            .unwrap();
        store
            .put("a-1.0.0.plist", Bytes::from_static(b"a"), "text/xml", Visibility::PublicRead)
            .await
            .unwrap();

        assert!(store.exists("a-1.0.0.plist").await.unwrap());
        assert_eq!(
            store.list_keys().await.unwrap(),
            vec!["a-1.0.0.plist".to_string(), "b-1.0.0.plist".to_string()]
        );
        assert_eq!(
            store.public_url("a-1.0.0.plist"),
            "https://builds.example.com/a-1.0.0.plist"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn public_objects_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), "https://builds.example.com");
        store
            .put("index.html", Bytes::from_static(b"<html/>"), "text/html", Visibility::PublicRead)
            .await
            .unwrap();

        let mode = std::fs::metadata(dir.path().join("index.html"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn missing_root_is_missing_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().join("nope"), "https://x");
        assert!(!store.container_exists().await.unwrap());
    }
}
