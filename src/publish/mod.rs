//! Artifact publishing.
//!
//! Publishing is append-only and never rolled back:
//!
//! 1. the `.ipa` upload is load-bearing - if it fails nothing else is written
//! 2. the install manifest and
//! 3. the index page are best-effort - failures are logged and recorded in
//!    the [`PublishReceipt`], and the pipeline still moves on to the
//!    repository stage because the artifact is already live
//!
//! # Module Organization
//!
//! - [`gate`] - at-most-once check and key derivation
//! - [`template`] - manifest and index templates
//! - [`index`] - index entries from store listings
//! - [`checksum`] - SHA-256 of uploaded artifacts

pub mod checksum;
pub mod gate;
pub mod index;
pub mod template;

pub use gate::{PublishGate, PublishTarget};
pub use template::{IndexEntry, TemplateSet};

use crate::error::Result;
use crate::ledger::ResolvedVersion;
use crate::metadata::BuildMetadata;
use crate::store::{ObjectStore, Visibility};
use bytes::Bytes;
use template::{IndexContext, ManifestContext};

const IPA_CONTENT_TYPE: &str = "application/octet-stream";
const PLIST_CONTENT_TYPE: &str = "application/xml";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Everything needed to publish one build.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    /// Raw `.ipa` bytes
    pub artifact: Bytes,
    /// Keys to write
    pub target: &'a PublishTarget,
    /// Metadata read from the bundle
    pub metadata: &'a BuildMetadata,
    /// Version with resolved build number
    pub version: &'a ResolvedVersion,
    /// Display title for this build
    pub title: &'a str,
    /// List every manifest in the store instead of only this build
    pub list_all_versions: bool,
}

/// What was published and what was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Public URL of the `.ipa`
    pub artifact_url: String,
    /// SHA-256 of the uploaded `.ipa`
    pub checksum: String,
    /// Public URL of the manifest, if it was written
    pub manifest_url: Option<String>,
    /// Public URL of the index page, if it was written
    pub index_url: Option<String>,
    /// Best-effort steps that failed
    pub warnings: Vec<String>,
}

/// Uploads artifacts, manifests and index pages to an [`ObjectStore`].
pub struct ArtifactPublisher<'a> {
    store: &'a dyn ObjectStore,
    templates: &'a TemplateSet,
    company_name: &'a str,
}

impl<'a> ArtifactPublisher<'a> {
    /// Publisher writing to `store`.
    pub fn new(store: &'a dyn ObjectStore, templates: &'a TemplateSet, company_name: &'a str) -> Self {
        Self {
            store,
            templates,
            company_name,
        }
    }

    /// Upload the artifact, then the manifest and index page.
    ///
    /// Only an artifact upload failure is returned as an error.
    pub async fn publish(&self, request: &PublishRequest<'_>) -> Result<PublishReceipt> {
        let target = request.target;
        let checksum = checksum::sha256_hex(&request.artifact);

        log::info!(
            "Uploading {} ({} bytes, sha256 {})",
            target.artifact_key,
            request.artifact.len(),
            checksum
        );
        self.store
            .put(
                &target.artifact_key,
                request.artifact.clone(),
                IPA_CONTENT_TYPE,
                Visibility::PublicRead,
            )
            .await?;
        let artifact_url = self.store.public_url(&target.artifact_key);

        let mut receipt = PublishReceipt {
            artifact_url,
            checksum,
            manifest_url: None,
            index_url: None,
            warnings: Vec::new(),
        };

        match self.publish_manifest(request, &receipt.artifact_url).await {
            Ok(url) => receipt.manifest_url = Some(url),
            Err(e) => {
                log::warn!("Manifest upload failed for {}: {}", target.manifest_key, e);
                receipt
                    .warnings
                    .push(format!("manifest {}: {}", target.manifest_key, e));
            }
        }

        match self.publish_index(request).await {
            Ok(url) => receipt.index_url = Some(url),
            Err(e) => {
                log::warn!("Index upload failed for {}: {}", target.index_key, e);
                receipt
                    .warnings
                    .push(format!("index {}: {}", target.index_key, e));
            }
        }

        Ok(receipt)
    }

    async fn publish_manifest(&self, request: &PublishRequest<'_>, ipa_url: &str) -> Result<String> {
        let manifest = self.templates.render_manifest(&ManifestContext {
            ipa_url,
            bundle_identifier: &request.metadata.bundle_identifier,
            version_string: &request.version.full,
            title: request.title,
        })?;

        let key = &request.target.manifest_key;
        self.store
            .put(key, Bytes::from(manifest), PLIST_CONTENT_TYPE, Visibility::PublicRead)
            .await?;
        log::info!("Uploaded manifest {}", key);
        Ok(self.store.public_url(key))
    }

    async fn publish_index(&self, request: &PublishRequest<'_>) -> Result<String> {
        let builds = if request.list_all_versions {
            let keys = self.store.list_keys().await?;
            index::entries_for_all_versions(&keys, &request.metadata.display_name, |key| {
                self.store.public_url(key)
            })
        } else {
            vec![IndexEntry {
                url: self.store.public_url(&request.target.manifest_key),
                title: request.title.to_string(),
            }]
        };

        let page = self.templates.render_index(&IndexContext {
            company_name: self.company_name,
            builds: &builds,
        })?;

        let key = &request.target.index_key;
        self.store
            .put(key, Bytes::from(page), HTML_CONTENT_TYPE, Visibility::PublicRead)
            .await?;
        log::info!("Uploaded {} listing {} build(s)", key, builds.len());
        Ok(self.store.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::store::MemoryObjectStore;

    fn metadata() -> BuildMetadata {
        BuildMetadata {
            bundle_version: "1.0".into(),
            bundle_identifier: "id".into(),
            display_name: "App".into(),
        }
    }

    #[tokio::test]
    async fn publishes_artifact_manifest_and_single_build_index() {
        let store = MemoryObjectStore::new("builds");
        let templates = TemplateSet::builtin().unwrap();
        let version = ResolvedVersion::new("1.0", 2);
        let target = PublishTarget::new("id", &version, None);
        let metadata = metadata();

        let receipt = ArtifactPublisher::new(&store, &templates, "Acme")
            .publish(&PublishRequest {
                artifact: Bytes::from_static(b"ipa-bytes"),
                target: &target,
                metadata: &metadata,
                version: &version,
                title: "App-1.0.2",
                list_all_versions: false,
            })
            .await
            .unwrap();

        assert_eq!(store.writes(), vec!["id-1.0.2.ipa", "id-1.0.2.plist", "index.html"]);
        assert!(receipt.warnings.is_empty());
        assert_eq!(receipt.artifact_url, store.public_url("id-1.0.2.ipa"));

        let ipa = store.get("id-1.0.2.ipa").unwrap();
        assert_eq!(ipa.visibility, Visibility::PublicRead);
        assert_eq!(&ipa.body[..], b"ipa-bytes");

        let index = store.get("index.html").unwrap();
        let html = String::from_utf8(index.body.to_vec()).unwrap();
        assert_eq!(html.matches("<li>").count(), 1);
        assert!(html.contains("App-1.0.2"));
    }

    #[tokio::test]
    async fn list_all_versions_enumerates_existing_manifests() {
        let store = MemoryObjectStore::new("builds")
            .with_object("id-1.0.0.ipa", "a")
            .with_object("id-1.0.0.plist", "a");
        let templates = TemplateSet::builtin().unwrap();
        let version = ResolvedVersion::new("1.0", 1);
        let target = PublishTarget::new("id", &version, Some("all"));
        let metadata = metadata();

        ArtifactPublisher::new(&store, &templates, "Acme")
            .publish(&PublishRequest {
                artifact: Bytes::from_static(b"b"),
                target: &target,
                metadata: &metadata,
                version: &version,
                title: "Beta",
                list_all_versions: true,
            })
            .await
            .unwrap();

        let html = String::from_utf8(store.get("all.html").unwrap().body.to_vec()).unwrap();
        assert!(html.contains(">App-1.0.0</a>"));
        assert!(html.contains(">App-1.0.1</a>"));
        assert_eq!(html.matches("<li>").count(), 2);
    }

    #[tokio::test]
    async fn artifact_failure_aborts_before_manifest() {
        let store = MemoryObjectStore::new("builds").reject_writes_to("id-1.0.0.ipa");
        let templates = TemplateSet::builtin().unwrap();
        let version = ResolvedVersion::new("1.0", 0);
        let target = PublishTarget::new("id", &version, None);
        let metadata = metadata();

        let err = ArtifactPublisher::new(&store, &templates, "Acme")
            .publish(&PublishRequest {
                artifact: Bytes::from_static(b"x"),
                target: &target,
                metadata: &metadata,
                version: &version,
                title: "T",
                list_all_versions: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Store(_)));
        assert_eq!(store.writes(), vec!["id-1.0.0.ipa"]);
    }

    #[tokio::test]
    async fn manifest_failure_is_recorded_and_index_still_written() {
        let store = MemoryObjectStore::new("builds").reject_writes_to("id-1.0.0.plist");
        let templates = TemplateSet::builtin().unwrap();
        let version = ResolvedVersion::new("1.0", 0);
        let target = PublishTarget::new("id", &version, None);
        let metadata = metadata();

        let receipt = ArtifactPublisher::new(&store, &templates, "Acme")
            .publish(&PublishRequest {
                artifact: Bytes::from_static(b"x"),
                target: &target,
                metadata: &metadata,
                version: &version,
                title: "T",
                list_all_versions: false,
            })
            .await
            .unwrap();

        assert!(receipt.manifest_url.is_none());
        assert!(receipt.index_url.is_some());
        assert_eq!(receipt.warnings.len(), 1);
        assert!(store.get("index.html").is_some());
    }
}
