//! Local working copy acquisition.

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{ErrorExt, PipelineError, Result};
use std::path::{Path, PathBuf};

/// A local checkout of the remote repository.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    /// Checkout directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory name for a remote: last path segment without `.git`.
///
/// Handles both `https://host/org/repo.git` and `git@host:org/repo.git`.
pub fn repo_name_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() || name == "." || name == ".." {
        return Err(PipelineError::ConfigurationMissing {
            what: format!("cannot derive a repository name from remote URL {:?}", url),
        });
    }
    Ok(name.to_string())
}

/// Open the canonical working copy under `work_dir`, cloning it if absent.
pub async fn acquire(
    runner: &dyn CommandRunner,
    git: &str,
    remote_url: &str,
    work_dir: &Path,
) -> Result<WorkingCopy> {
    let name = repo_name_from_url(remote_url)?;
    let path = work_dir.join(&name);

    if tokio::fs::try_exists(&path)
        .await
        .fs_context("checking working copy", &path)?
    {
        gix::open(&path).map_err(|e| PipelineError::Command {
            stage: "acquire".to_string(),
            command: format!("open {}", path.display()),
            exit_code: None,
            stderr: format!("existing directory is not a git repository: {}", e),
        })?;
        log::info!("Opening repo {} at {}", name, path.display());
        return Ok(WorkingCopy { path });
    }

    log::info!("Cloning repo {} into {}", name, path.display());
    tokio::fs::create_dir_all(work_dir)
        .await
        .fs_context("creating work directory", work_dir)?;

    let command = CommandSpec::new(git)
        .arg("clone")
        .arg(remote_url)
        .path_arg(&path)
        .current_dir(work_dir);
    runner.run(&command).await?.check("clone", &command)?;

    Ok(WorkingCopy { path })
}
