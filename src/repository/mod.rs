//! Source repository version bump.
//!
//! After the artifact is live, the project's build number is bumped in the
//! repository it was built from:
//!
//! 1. **Acquire** - open `{work_dir}/{repo_name}` or clone it
//! 2. **Sync** - `git checkout <branch>` then `git pull origin <branch>`
//! 3. **Guard** - `git rev-parse HEAD` must equal the commit the build came
//!    from; otherwise the branch moved and the bump is skipped
//! 4. **Bump** - `agvtool new-version <build>`
//! 5. **Commit** - `git commit -am` only if `git status --porcelain` is dirty
//! 6. **Tag** - `git tag <prefix><version>` when the branch has a tag prefix
//! 7. **Push** - `git push origin <branch> --tags`, then report the new head
//!    as `success` to the [`StatusReporter`]
//!
//! Every external command goes through the injected [`CommandRunner`]; a
//! nonzero exit stops the sequence with [`PipelineError::Command`] naming the
//! stage.
//!
//! # Module Organization
//!
//! - [`working_copy`] - locating, opening and cloning the checkout
//! - [`status`] - commit status reporting

pub mod status;
pub mod working_copy;

pub use status::{GithubStatusReporter, NoopStatusReporter, StatusReporter};
pub use working_copy::WorkingCopy;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Inputs for one bump.
#[derive(Debug, Clone)]
pub struct BumpRequest<'a> {
    /// Remote to clone from and push to
    pub remote_url: &'a str,
    /// Branch the build was made from
    pub branch: &'a str,
    /// Commit the build was made from
    pub expected_commit: &'a str,
    /// New project build number
    pub build_number: u64,
    /// Full version string, used for the tag name
    pub version_string: &'a str,
    /// Tag prefix; no tag is created when absent
    pub tag_prefix: Option<&'a str>,
}

/// Result of a bump that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpOutcome {
    /// Bump pushed
    Pushed {
        /// Branch head after the push
        new_head: String,
        /// Tag created, if any
        tag: Option<String>,
        /// Whether a commit was made (false when the bump changed nothing)
        committed: bool,
        /// Why the new head could not be marked as `success`, if it could not
        status_warning: Option<String>,
    },
    /// Branch head moved since the build; nothing was changed
    Skipped {
        /// Commit the build was made from
        expected: String,
        /// Head found after syncing
        current: String,
    },
}

/// Commit message for a build number bump.
pub fn bump_commit_message(build_number: u64) -> String {
    format!("Bumped build version to {}.", build_number)
}

/// Bumps, commits, tags and pushes the project build number.
pub struct RepositoryVersionBumper<'a> {
    runner: &'a dyn CommandRunner,
    status: &'a dyn StatusReporter,
    git: String,
    agvtool: String,
    work_dir: PathBuf,
}

impl<'a> RepositoryVersionBumper<'a> {
    /// Bumper keeping its working copies under `work_dir`.
    pub fn new(
        runner: &'a dyn CommandRunner,
        status: &'a dyn StatusReporter,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            status,
            git: "git".to_string(),
            agvtool: "agvtool".to_string(),
            work_dir: work_dir.into(),
        }
    }

    /// Use explicit tool paths instead of resolving `git`/`agvtool` on `PATH`.
    pub fn with_tools(mut self, git: impl Into<String>, agvtool: impl Into<String>) -> Self {
        self.git = git.into();
        self.agvtool = agvtool.into();
        self
    }

    /// Run the bump sequence.
    pub async fn bump(&self, request: &BumpRequest<'_>) -> Result<BumpOutcome> {
        let copy =
            working_copy::acquire(self.runner, &self.git, request.remote_url, &self.work_dir)
                .await?;
        let repo = copy.path();

        log::info!("Syncing {} with origin", request.branch);
        self.git(repo, "checkout", &["checkout", request.branch]).await?;
        self.git(repo, "pull", &["pull", "origin", request.branch])
            .await?;

        let current = self.head(repo, "guard").await?;
        let expected = request.expected_commit.trim();
        if current != expected {
            log::warn!(
                "{} moved since the build ({} != {}); not bumping",
                request.branch,
                current,
                expected
            );
            return Ok(BumpOutcome::Skipped {
                expected: expected.to_string(),
                current,
            });
        }

        log::info!("Bumping build version to {}", request.build_number);
        let bump = CommandSpec::new(&self.agvtool)
            .arg("new-version")
            .arg(request.build_number.to_string())
            .current_dir(repo);
        self.runner.run(&bump).await?.check("bump", &bump)?;

        let committed = self.commit_if_dirty(repo, request.build_number).await?;

        let tag = match request.tag_prefix {
            Some(prefix) => {
                let tag = format!("{}{}", prefix, request.version_string);
                log::info!("Tagging {}", tag);
                self.git(repo, "tag", &["tag", &tag]).await?;
                Some(tag)
            }
            None => None,
        };

        log::info!("Pushing {} to origin", request.branch);
        self.git(repo, "push", &["push", "origin", request.branch, "--tags"])
            .await?;

        let new_head = self.head(repo, "push").await?;
        let status_warning = match self.status.report_success(&new_head).await {
            Ok(()) => None,
            Err(e) => {
                let warning = format!("Pushed {} but could not report its status: {}", new_head, e);
                log::warn!("{}", warning);
                Some(warning)
            }
        };

        Ok(BumpOutcome::Pushed {
            new_head,
            tag,
            committed,
            status_warning,
        })
    }

    async fn commit_if_dirty(&self, repo: &Path, build_number: u64) -> Result<bool> {
        let status = self.git(repo, "commit", &["status", "--porcelain"]).await?;
        if status.stdout.trim().is_empty() {
            log::info!("Nothing changed by the version bump; skipping commit");
            return Ok(false);
        }

        let message = bump_commit_message(build_number);
        self.git(repo, "commit", &["commit", "-am", &message]).await?;
        Ok(true)
    }

    async fn head(&self, repo: &Path, stage: &str) -> Result<String> {
        let output = self.git(repo, stage, &["rev-parse", "HEAD"]).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn git(&self, repo: &Path, stage: &str, args: &[&str]) -> Result<CommandOutput> {
        let command = CommandSpec::new(&self.git)
            .args(args.iter().copied())
            .current_dir(repo);
        self.runner.run(&command).await?.check(stage, &command)
    }
}
