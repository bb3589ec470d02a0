//! Timestamp-namespaced scratch directory with guaranteed cleanup.

use crate::error::{ErrorExt, Result};
use std::io;
use std::path::{Path, PathBuf};

/// Scratch directory removed when dropped.
///
/// Holding the guard across the extract and parse steps means the directory
/// goes away on every exit path, including early returns on parse failure.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `{root}/{unix-millis}` (suffixed on collision).
    pub async fn create(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .fs_context("creating work directory", root)?;

        let stamp = chrono::Utc::now().timestamp_millis();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                stamp.to_string()
            } else {
                format!("{}-{}", stamp, attempt)
            };
            let path = root.join(name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    log::debug!("Created scratch directory {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e).fs_context("creating scratch directory", &path),
            }
        }
    }

    /// Location of the scratch directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed scratch directory {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(root.path()).await.unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(path.join("Info.plist"), b"x").unwrap();
        assert!(path.is_dir());

        drop(scratch);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_guards_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let first = ScratchDir::create(root.path()).await.unwrap();
        let second = ScratchDir::create(root.path()).await.unwrap();
        assert_ne!(first.path(), second.path());
    }
}
