//! Pipeline configuration loaded from `ota.toml`.
//!
//! # Configuration
//!
//! ```toml
//! company_name = "Acme"
//! work_dir = "/var/lib/kodegen-ota"
//!
//! [git]
//! remote_url = "git@github.com:acme/app.git"
//!
//! [store]
//! kind = "s3"
//! bucket = "acme-builds"
//! endpoint = "https://builds-gateway.acme.internal/acme-builds"
//! token_env = "OTA_STORE_TOKEN"
//!
//! [branches.beta]
//! display_name = "Acme Beta"
//! html_file_name = "beta"
//! list_all_versions = true
//! tag_prefix = "beta-"
//! ```
//!
//! Credentials never live in the file; `token_env` names the environment
//! variable they are read from.
//!
//! The `s3` store only sends that token as a bearer credential and does not
//! sign requests. AWS rejects such requests, so `endpoint` must point at a
//! gateway (or S3-compatible service) that accepts bearer tokens. Without
//! `endpoint` the bucket's public AWS host is used directly, which only
//! works for buckets that allow anonymous `HEAD`/`PUT`.

use crate::error::{ErrorExt, PipelineError, Result};
use crate::ledger::LEDGER_FILE_NAME;
use crate::metadata::PlistTools;
use crate::repository::status::DEFAULT_STATUS_CONTEXT;
use crate::repository::{GithubStatusReporter, NoopStatusReporter, StatusReporter};
use crate::store::{FsObjectStore, HttpObjectStore, ObjectStore};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "ota.toml";

/// Default environment variable holding the store token.
pub const DEFAULT_STORE_TOKEN_ENV: &str = "OTA_STORE_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Shown in the index page heading
    pub company_name: String,

    /// Holds working copies, scratch directories and the ledger.
    ///
    /// Default: `{temp_dir}/kodegen-ota`
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Ledger file. Default: `{work_dir}/.last-build-version`
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,

    /// Source repository
    pub git: GitConfig,

    /// Object store; publishing is refused when absent
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Template overrides
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Per-branch overrides keyed by branch name
    #[serde(default)]
    pub branches: BTreeMap<String, BranchConfig>,
}

/// Source repository settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    /// Clone and push URL
    pub remote_url: String,

    /// Commit status context label
    #[serde(default = "default_status_context")]
    pub status_context: String,

    /// Status API base URL
    #[serde(default = "default_github_api")]
    pub github_api: String,
}

/// Where published builds go.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// S3-style HTTP bucket
    S3 {
        /// Bucket name
        bucket: String,
        /// Bearer-token gateway or S3-compatible service in front of the
        /// bucket; required for any bucket that needs authentication
        #[serde(default)]
        endpoint: Option<String>,
        /// Environment variable holding the bearer token
        #[serde(default = "default_store_token_env")]
        token_env: String,
    },
    /// Directory served by a web server
    Filesystem {
        /// Directory acting as the bucket
        root: PathBuf,
        /// Public URL of `root`
        base_url: String,
    },
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// `plutil` and `PlistBuddy`
    #[serde(flatten)]
    pub plist: PlistTools,
    /// `git` binary
    pub git: String,
    /// `agvtool` binary
    pub agvtool: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            plist: PlistTools::default(),
            git: "git".to_string(),
            agvtool: "agvtool".to_string(),
        }
    }
}

/// Template file overrides; builtin templates are used when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    #[serde(default)]
    pub index: Option<PathBuf>,
}

/// Per-branch overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BranchConfig {
    /// Title for builds of this branch instead of `{display_name}-{version}`
    pub display_name: Option<String>,
    /// Index page name without `.html`
    pub html_file_name: Option<String>,
    /// List every published manifest on the index page
    pub list_all_versions: bool,
    /// Tag pushed builds as `{prefix}{version}`
    pub tag_prefix: Option<String>,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("kodegen-ota")
}

fn default_status_context() -> String {
    DEFAULT_STATUS_CONTEXT.to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_store_token_env() -> String {
    DEFAULT_STORE_TOKEN_ENV.to_string()
}

impl Config {
    /// Read and parse the configuration file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .fs_context("reading configuration", path)?;
        Self::from_toml_str(path, &contents)
    }

    /// Parse configuration text; `path` is only used in error messages.
    pub fn from_toml_str(path: &Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|error| PipelineError::Config {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Overrides for `branch`, or defaults when none are configured.
    pub fn branch(&self, branch: &str) -> BranchConfig {
        self.branches.get(branch).cloned().unwrap_or_default()
    }

    /// Ledger file location.
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.work_dir.join(LEDGER_FILE_NAME))
    }

    /// Build the configured object store, reading credentials from the process
    /// environment.
    pub fn object_store(&self) -> Result<Box<dyn ObjectStore>> {
        self.object_store_with(|name| std::env::var(name).ok())
    }

    /// Build the configured object store, reading credentials through `env`.
    pub fn object_store_with<F>(&self, env: F) -> Result<Box<dyn ObjectStore>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| PipelineError::ConfigurationMissing {
                what: "no [store] section; refusing to publish".to_string(),
            })?;

        match store {
            StoreConfig::S3 {
                bucket,
                endpoint,
                token_env,
            } => {
                let token = env(token_env)
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| PipelineError::ConfigurationMissing {
                        what: format!("store credentials (set {})", token_env),
                    })?;
                let store = match endpoint {
                    Some(endpoint) => HttpObjectStore::with_endpoint(bucket, endpoint, token)?,
                    None => {
                        log::warn!(
                            "No endpoint for bucket {}; requests go straight to AWS, which does not accept bearer tokens",
                            bucket
                        );
                        HttpObjectStore::new(bucket, token)?
                    }
                };
                Ok(Box::new(store))
            }
            StoreConfig::Filesystem { root, base_url } => {
                Ok(Box::new(FsObjectStore::new(root, base_url)))
            }
        }
    }

    /// Commit status reporter; a no-op when no token is available.
    pub fn status_reporter(&self, token: Option<String>) -> Result<Box<dyn StatusReporter>> {
        match token.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                let reporter =
                    GithubStatusReporter::for_remote(&self.git.github_api, &self.git.remote_url, token)?
                        .with_context(&self.git.status_context);
                Ok(Box::new(reporter))
            }
            None => Ok(Box::new(NoopStatusReporter)),
        }
    }
}
