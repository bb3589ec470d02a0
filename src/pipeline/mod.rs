//! End-to-end publish pipeline.
//!
//! Stages run strictly in order, each producing a [`Stage`]:
//!
//! ```text
//! preflight → extract + parse → resolve version → gate → publish → bump → record
//! ```
//!
//! - the gate halts with [`HaltReason::AlreadyPublished`] before any write
//! - the bump halts with [`HaltReason::GuardMismatch`] when the branch moved;
//!   the artifact is live by then and stays published
//! - the ledger is written last, only after the bump was pushed
//!
//! # Module Organization
//!
//! - [`stage`] - stage results and the [`proceed!`](crate::proceed) macro

pub mod stage;

pub use stage::{HaltReason, Stage};

use crate::archive::{self, ScratchDir, INFO_PLIST};
use crate::command::CommandRunner;
use crate::config::{BranchConfig, Config};
use crate::error::{ErrorExt, PipelineError, Result};
use crate::ledger::{LedgerTransaction, ResolvedVersion};
use crate::metadata::{BuildMetadata, MetadataParser};
use crate::proceed;
use crate::publish::{
    ArtifactPublisher, PublishGate, PublishReceipt, PublishRequest, PublishTarget, TemplateSet,
};
use crate::repository::{BumpOutcome, BumpRequest, RepositoryVersionBumper, StatusReporter};
use crate::store::ObjectStore;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// The `.ipa` to publish
    pub artifact_path: PathBuf,
    /// Branch the build was made from
    pub branch: String,
    /// Commit the build was made from
    pub expected_commit: String,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Artifact published, repository bumped and pushed, ledger recorded
    Published {
        version: ResolvedVersion,
        receipt: PublishReceipt,
        new_head: String,
        tag: Option<String>,
        /// Set when the pushed head could not be marked as `success`
        status_warning: Option<String>,
    },
    /// Nothing written; this version was already in the store
    AlreadyPublished { title: String, manifest_key: String },
    /// Artifact published but the branch moved, so the repository and ledger
    /// were left alone
    BumpSkipped {
        version: ResolvedVersion,
        receipt: PublishReceipt,
        expected: String,
        current: String,
    },
}

impl From<HaltReason> for PipelineOutcome {
    fn from(reason: HaltReason) -> Self {
        match reason {
            HaltReason::AlreadyPublished {
                title,
                manifest_key,
            } => Self::AlreadyPublished {
                title,
                manifest_key,
            },
            HaltReason::GuardMismatch {
                version,
                receipt,
                expected,
                current,
            } => Self::BumpSkipped {
                version,
                receipt,
                expected,
                current,
            },
        }
    }
}

/// Receives a line per completed stage.
pub trait Progress: Send + Sync {
    /// `stage` finished; `detail` is a short human-readable summary.
    fn stage_completed(&self, stage: &str, detail: &str);
}

/// [`Progress`] that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn stage_completed(&self, _stage: &str, _detail: &str) {}
}

/// Title a build is listed under: the branch override or `{name}-{version}`.
pub fn display_title(branch: &BranchConfig, metadata: &BuildMetadata, version: &ResolvedVersion) -> String {
    branch
        .display_name
        .clone()
        .unwrap_or_else(|| format!("{}-{}", metadata.display_name, version.full))
}

struct Published {
    version: ResolvedVersion,
    receipt: PublishReceipt,
    new_head: String,
    tag: Option<String>,
    status_warning: Option<String>,
}

/// Wires the pipeline's collaborators together.
pub struct Pipeline<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    store: Option<&'a dyn ObjectStore>,
    status: &'a dyn StatusReporter,
    templates: &'a TemplateSet,
    progress: &'a dyn Progress,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        status: &'a dyn StatusReporter,
        templates: &'a TemplateSet,
    ) -> Self {
        Self {
            config,
            runner,
            store: None,
            status,
            templates,
            progress: &NoProgress,
        }
    }

    /// Object store to publish to; without one every run fails preflight.
    pub fn with_store(mut self, store: &'a dyn ObjectStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Report completed stages to `progress`.
    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Run every stage for `request`.
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome> {
        match self.execute(request).await {
            Stage::Continue(published) => Ok(PipelineOutcome::Published {
                version: published.version,
                receipt: published.receipt,
                new_head: published.new_head,
                tag: published.tag,
                status_warning: published.status_warning,
            }),
            Stage::Halt(reason) => Ok(reason.into()),
            Stage::Fail(error) => {
                log::error!("Pipeline failed at {}: {}", error.stage(), error);
                Err(error)
            }
        }
    }

    async fn execute(&self, request: &PipelineRequest) -> Stage<Published> {
        let store = proceed!(self.preflight(&request.artifact_path).await);
        self.progress
            .stage_completed("preflight", store.container_name());

        let metadata = proceed!(self.read_metadata(&request.artifact_path).await);
        self.progress.stage_completed(
            "metadata",
            &format!("{} {}", metadata.bundle_identifier, metadata.bundle_version),
        );

        let ledger = proceed!(LedgerTransaction::load(&self.config.ledger_path()).await);
        let version = proceed!(ledger.resolve(&metadata));
        self.progress.stage_completed("version", &version.full);

        let branch = self.config.branch(&request.branch);
        let title = display_title(&branch, &metadata, &version);
        let target = PublishTarget::new(
            &metadata.bundle_identifier,
            &version,
            branch.html_file_name.as_deref(),
        );

        if proceed!(PublishGate::new(store).already_published(&target).await) {
            return Stage::Halt(HaltReason::AlreadyPublished {
                title,
                manifest_key: target.manifest_key,
            });
        }

        let artifact = proceed!(
            tokio::fs::read(&request.artifact_path)
                .await
                .fs_context("reading artifact", &request.artifact_path)
        );
        let receipt = proceed!(
            ArtifactPublisher::new(store, self.templates, &self.config.company_name)
                .publish(&PublishRequest {
                    artifact: Bytes::from(artifact),
                    target: &target,
                    metadata: &metadata,
                    version: &version,
                    title: &title,
                    list_all_versions: branch.list_all_versions,
                })
                .await
        );
        self.progress
            .stage_completed("publish", &receipt.artifact_url);

        let bumper = RepositoryVersionBumper::new(self.runner, self.status, &self.config.work_dir)
            .with_tools(&self.config.tools.git, &self.config.tools.agvtool);
        let bumped = proceed!(
            bumper
                .bump(&BumpRequest {
                    remote_url: &self.config.git.remote_url,
                    branch: &request.branch,
                    expected_commit: &request.expected_commit,
                    build_number: version.build_number,
                    version_string: &version.full,
                    tag_prefix: branch.tag_prefix.as_deref(),
                })
                .await
        );

        match bumped {
            BumpOutcome::Skipped { expected, current } => Stage::Halt(HaltReason::GuardMismatch {
                version,
                receipt,
                expected,
                current,
            }),
            BumpOutcome::Pushed {
                new_head,
                tag,
                status_warning,
                ..
            } => {
                self.progress.stage_completed("repository", &new_head);
                proceed!(ledger.commit(&version.major_minor, version.build_number).await);
                self.progress.stage_completed("ledger", &version.full);
                Stage::Continue(Published {
                    version,
                    receipt,
                    new_head,
                    tag,
                    status_warning,
                })
            }
        }
    }

    async fn preflight(&self, artifact_path: &Path) -> Result<&'a dyn ObjectStore> {
        let store = self
            .store
            .ok_or_else(|| PipelineError::ConfigurationMissing {
                what: "object store; refusing to publish".to_string(),
            })?;

        let artifact_exists = tokio::fs::try_exists(artifact_path)
            .await
            .fs_context("checking artifact", artifact_path)?;
        if !artifact_exists {
            return Err(PipelineError::NotFound {
                what: format!("artifact {}", artifact_path.display()),
            });
        }

        if !store.container_exists().await? {
            return Err(PipelineError::NotFound {
                what: format!("store container {}", store.container_name()),
            });
        }

        Ok(store)
    }

    /// Extract and parse `Info.plist`; the scratch directory is gone when
    /// this returns, whatever the result.
    async fn read_metadata(&self, artifact_path: &Path) -> Result<BuildMetadata> {
        let scratch = ScratchDir::create(&self.config.work_dir).await?;
        let plist = archive::extract_member(artifact_path, INFO_PLIST, &scratch).await?;
        MetadataParser::new(self.runner, &self.config.tools.plist)
            .parse(&plist)
            .await
    }
}
