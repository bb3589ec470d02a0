//! Per-minor-version build number ledger.
//!
//! The ledger is a flat JSON object mapping `"major.minor"` to the last build
//! number used for that version line. It is loaded once at the start of a run
//! and written once at the very end, after the repository was tagged and
//! pushed, so a failed run never advances it.
//!
//! Only one pipeline may hold the ledger at a time; nothing here locks the
//! file.

use crate::error::{ErrorExt, PipelineError, Result};
use crate::metadata::BuildMetadata;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Default ledger file name inside the work directory.
pub const LEDGER_FILE_NAME: &str = ".last-build-version";

/// A version with its build number resolved from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Ledger key, "major.minor"
    pub major_minor: String,
    /// Build number for this run
    pub build_number: u64,
    /// "major.minor.build"
    pub full: String,
}

impl ResolvedVersion {
    /// Combine a minor version and a build number.
    pub fn new(major_minor: impl Into<String>, build_number: u64) -> Self {
        let major_minor = major_minor.into();
        let full = format!("{}.{}", major_minor, build_number);
        Self {
            major_minor,
            build_number,
            full,
        }
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// In-memory snapshot of the ledger.
///
/// [`commit`](Self::commit) consumes the transaction, so it can run at most
/// once per load.
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    path: PathBuf,
    entries: BTreeMap<String, u64>,
}

impl LedgerTransaction {
    /// Load the ledger at `path`; a missing file is an empty ledger.
    pub async fn load(path: &Path) -> Result<Self> {
        let entries = match tokio::fs::read_to_string(path).await {
            Ok(contents) => parse_entries(path, &contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No build ledger at {}, starting fresh", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e).fs_context("reading build ledger", path),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Last build number recorded for `major_minor`.
    pub fn last_build_number(&self, major_minor: &str) -> Option<u64> {
        self.entries.get(major_minor).copied()
    }

    /// Build number the next run of `major_minor` should use.
    ///
    /// Pure read: `stored + 1`, or 0 for a version line never seen before.
    pub fn next_build_number(&self, major_minor: &str) -> u64 {
        self.last_build_number(major_minor)
            .map_or(0, |last| last.saturating_add(1))
    }

    /// Resolve the full version for `metadata`.
    pub fn resolve(&self, metadata: &BuildMetadata) -> Result<ResolvedVersion> {
        let major_minor = metadata.major_minor()?;
        let build_number = self.next_build_number(&major_minor);
        Ok(ResolvedVersion::new(major_minor, build_number))
    }

    /// Record `build_number` for `major_minor` and rewrite the file.
    ///
    /// The file is written to a sibling temp file and renamed over the
    /// original. Moving a version line backwards is refused.
    pub async fn commit(mut self, major_minor: &str, build_number: u64) -> Result<()> {
        let last = self.last_build_number(major_minor);
        if let Some(last) = last.filter(|last| build_number < *last) {
            return Err(PipelineError::LedgerCorrupt {
                path: self.path,
                key: major_minor.to_string(),
                reason: format!(
                    "refusing to move build number back from {} to {}",
                    last, build_number
                ),
            });
        }
        self.entries.insert(major_minor.to_string(), build_number);

        let json = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating ledger directory", parent)?;
        }

        let tmp = temp_sibling(&self.path);
        tokio::fs::write(&tmp, json)
            .await
            .fs_context("writing build ledger", &tmp)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .fs_context("replacing build ledger", &self.path)?;

        log::info!(
            "Recorded build {} for {} in {}",
            build_number,
            major_minor,
            self.path.display()
        );
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn parse_entries(path: &Path, contents: &str) -> Result<BTreeMap<String, u64>> {
    let corrupt = |key: &str, reason: String| PipelineError::LedgerCorrupt {
        path: path.to_path_buf(),
        key: key.to_string(),
        reason,
    };

    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let document: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| corrupt("", e.to_string()))?;
    let object = document
        .as_object()
        .ok_or_else(|| corrupt("", "expected a JSON object".to_string()))?;

    let mut entries = BTreeMap::new();
    for (key, value) in object {
        // Integer strings are tolerated; older ledgers were written loosely
        let build = match value {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| corrupt(key, format!("{} is not a build number", value)))?;
        entries.insert(key.clone(), build);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_every_version_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerTransaction::load(&dir.path().join(LEDGER_FILE_NAME))
            .await
            .unwrap();

        let version = ResolvedVersion::new("2.3", ledger.next_build_number("2.3"));
        assert_eq!(version.build_number, 0);
        assert_eq!(version.full, "2.3.0");
    }

    #[tokio::test]
    async fn existing_entry_resolves_to_next_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE_NAME);
        std::fs::write(&path, r#"{"2.3": 4}"#).unwrap();

        let ledger = LedgerTransaction::load(&path).await.unwrap();
        let metadata = BuildMetadata {
            bundle_version: "2.3".into(),
            bundle_identifier: "com.app.foo".into(),
            display_name: "Foo".into(),
        };
        let version = ledger.resolve(&metadata).unwrap();
        assert_eq!(version, ResolvedVersion::new("2.3", 5));
        assert_eq!(version.to_string(), "2.3.5");
    }

    #[tokio::test]
    async fn next_build_number_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE_NAME);
        std::fs::write(&path, r#"{"1.0": 9}"#).unwrap();

        let ledger = LedgerTransaction::load(&path).await.unwrap();
        assert_eq!(ledger.next_build_number("1.0"), 10);
        assert_eq!(ledger.next_build_number("1.0"), 10);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"1.0": 9}"#);
    }

    #[tokio::test]
    async fn commit_then_reload_advances_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join(LEDGER_FILE_NAME);

        let ledger = LedgerTransaction::load(&path).await.unwrap();
        ledger.commit("2.3", 7).await.unwrap();

        let reloaded = LedgerTransaction::load(&path).await.unwrap();
        assert_eq!(reloaded.next_build_number("2.3"), 8);
        assert_eq!(reloaded.next_build_number("2.4"), 0);
        assert!(!temp_sibling(&path).exists());
    }

    #[tokio::test]
    async fn commit_keeps_other_version_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE_NAME);
        std::fs::write(&path, r#"{"1.0": 3, "2.0": "11"}"#).unwrap();

        LedgerTransaction::load(&path)
            .await
            .unwrap()
            .commit("2.0", 12)
            .await
            .unwrap();

        let reloaded = LedgerTransaction::load(&path).await.unwrap();
        assert_eq!(reloaded.last_build_number("1.0"), Some(3));
        assert_eq!(reloaded.last_build_number("2.0"), Some(12));
    }

    #[tokio::test]
    async fn malformed_value_is_ledger_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE_NAME);
        std::fs::write(&path, r#"{"2.3": "four"}"#).unwrap();

        let err = LedgerTransaction::load(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::LedgerCorrupt { ref key, .. } if key == "2.3"));
    }

    #[tokio::test]
    async fn non_object_document_is_ledger_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE_NAME);
        std::fs::write(&path, "[1, 2]").unwrap();

        assert!(matches!(
            LedgerTransaction::load(&path).await,
            Err(PipelineError::LedgerCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn commit_refuses_to_go_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE_NAME);
        std::fs::write(&path, r#"{"2.3": 4}"#).unwrap();

        let ledger = LedgerTransaction::load(&path).await.unwrap();
        assert!(ledger.commit("2.3", 2).await.is_err());
    }
}
