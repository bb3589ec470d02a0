//! At-most-once publish check.

use crate::error::Result;
use crate::ledger::ResolvedVersion;
use crate::store::ObjectStore;

/// Index page name when the branch does not override it.
pub const DEFAULT_INDEX_NAME: &str = "index";

/// Object keys a build is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// `{identifier}-{version}.ipa`
    pub artifact_key: String,
    /// `{identifier}-{version}.plist`
    pub manifest_key: String,
    /// `{index_name}.html`
    pub index_key: String,
}

impl PublishTarget {
    /// Derive keys from the bundle identifier and resolved version.
    pub fn new(bundle_identifier: &str, version: &ResolvedVersion, index_name: Option<&str>) -> Self {
        let stem = format!("{}-{}", bundle_identifier, version.full);
        Self {
            artifact_key: format!("{}.ipa", stem),
            manifest_key: format!("{}.plist", stem),
            index_key: format!("{}.html", index_name.unwrap_or(DEFAULT_INDEX_NAME)),
        }
    }
}

/// Decides whether a target was already published.
///
/// The manifest is written after the artifact, so its presence means the
/// build went out. Keys embed the resolved version, so a replayed or
/// corrupted ledger can at worst re-resolve a version that the gate then
/// turns into a no-op.
pub struct PublishGate<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> PublishGate<'a> {
    /// Gate over `store`.
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// True when the manifest for `target` already exists.
    pub async fn already_published(&self, target: &PublishTarget) -> Result<bool> {
        let exists = self.store.exists(&target.manifest_key).await?;
        if exists {
            log::info!(
                "{} already exists in {}",
                target.manifest_key,
                self.store.container_name()
            );
        }
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    #[test]
    fn keys_embed_identifier_and_full_version() {
        let target = PublishTarget::new("com.app.foo", &ResolvedVersion::new("2.3", 5), None);
        assert_eq!(target.artifact_key, "com.app.foo-2.3.5.ipa");
        assert_eq!(target.manifest_key, "com.app.foo-2.3.5.plist");
        assert_eq!(target.index_key, "index.html");

        let custom = PublishTarget::new("com.app.foo", &ResolvedVersion::new("2.3", 5), Some("beta"));
        assert_eq!(custom.index_key, "beta.html");
    }

    #[tokio::test]
    async fn existing_manifest_means_already_published() {
        let store = MemoryObjectStore::new("builds").with_object("com.app.foo-2.3.5.plist", "x");
        let gate = PublishGate::new(&store);

        let published = PublishTarget::new("com.app.foo", &ResolvedVersion::new("2.3", 5), None);
        let fresh = PublishTarget::new("com.app.foo", &ResolvedVersion::new("2.3", 6), None);
        assert!(gate.already_published(&published).await.unwrap());
        assert!(!gate.already_published(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn artifact_without_manifest_is_not_published() {
        let store = MemoryObjectStore::new("builds").with_object("com.app.foo-2.3.5.ipa", "x");
        let target = PublishTarget::new("com.app.foo", &ResolvedVersion::new("2.3", 5), None);
        assert!(!PublishGate::new(&store).already_published(&target).await.unwrap());
    }
}
