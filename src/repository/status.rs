//! Commit status reporting.
//!
//! After the version-bump commit is pushed it is marked `success`, so the CI
//! trigger that watches the branch does not build the bot's own commit.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Default status context shown next to the commit.
pub const DEFAULT_STATUS_CONTEXT: &str = "kodegen/ota";

/// Marks commits as successful on the hosting service.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Report `commit` as `success`.
    async fn report_success(&self, commit: &str) -> Result<()>;
}

/// Used when no API token is configured; every report fails so the caller
/// can surface that the commit was left unmarked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusReporter;

#[async_trait]
impl StatusReporter for NoopStatusReporter {
    async fn report_success(&self, commit: &str) -> Result<()> {
        Err(PipelineError::StatusApi(format!(
            "no API token configured; commit {} not marked as success",
            commit
        )))
    }
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: &'a str,
    context: &'a str,
    description: &'a str,
}

/// GitHub commit status API client.
#[derive(Debug, Clone)]
pub struct GithubStatusReporter {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
    context: String,
}

impl GithubStatusReporter {
    /// Reporter for `owner/repo` on `api_base` (e.g. `https://api.github.com`).
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            context: DEFAULT_STATUS_CONTEXT.to_string(),
        }
    }

    /// Reporter for the repository behind a GitHub remote URL.
    pub fn for_remote(api_base: &str, remote_url: &str, token: impl Into<String>) -> Result<Self> {
        let (owner, repo) = parse_github_remote(remote_url).ok_or_else(|| {
            PipelineError::ConfigurationMissing {
                what: format!("remote {:?} is not a GitHub owner/repo URL", remote_url),
            }
        })?;
        Ok(Self::new(api_base, owner, repo, token))
    }

    /// Override the status context label.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Endpoint the status for `commit` is posted to.
    pub fn status_url(&self, commit: &str) -> String {
        format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_base, self.owner, self.repo, commit
        )
    }
}

#[async_trait]
impl StatusReporter for GithubStatusReporter {
    async fn report_success(&self, commit: &str) -> Result<()> {
        let url = self.status_url(commit);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, "kodegen_bundler_ota")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&StatusBody {
                state: "success",
                context: &self.context,
                description: "Build number bump",
            })
            .send()
            .await
            .map_err(|e| PipelineError::StatusApi(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::StatusApi(format!(
                "POST {} returned {}: {}",
                url,
                status.as_u16(),
                body.trim()
            )));
        }

        log::info!("Marked {} as success", commit);
        Ok(())
    }
}

/// `(owner, repo)` from `https://github.com/o/r(.git)` or `git@github.com:o/r(.git)`.
pub fn parse_github_remote(url: &str) -> Option<(String, String)> {
    let url = url.trim().trim_end_matches('/');
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')?.1
    } else {
        let without_scheme = url.split_once("://")?.1;
        without_scheme.split_once('/')?.1
    };

    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_and_ssh_remotes() {
        assert_eq!(
            parse_github_remote("https://github.com/acme/app.git"),
            Some(("acme".into(), "app".into()))
        );
        assert_eq!(
            parse_github_remote("git@github.com:acme/app.git"),
            Some(("acme".into(), "app".into()))
        );
        assert_eq!(
            parse_github_remote("https://github.com/acme/app"),
            Some(("acme".into(), "app".into()))
        );
        assert_eq!(parse_github_remote("https://github.com/acme"), None);
        assert_eq!(parse_github_remote("not a url"), None);
    }

    #[tokio::test]
    async fn missing_token_reports_as_failure() {
        let err = NoopStatusReporter.report_success("abc123").await.unwrap_err();
        assert_eq!(err.stage(), "notify");
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn status_url_targets_commit() {
        let reporter = GithubStatusReporter::for_remote(
            "https://api.github.com/",
            "https://github.com/acme/app.git",
            "t",
        )
        .unwrap();
        assert_eq!(
            reporter.status_url("abc123"),
            "https://api.github.com/repos/acme/app/statuses/abc123"
        );
    }
}
