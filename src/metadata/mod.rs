//! Build metadata from an extracted `Info.plist`.
//!
//! The plist inside a shipped `.ipa` is normally binary. It is normalised to
//! XML in place with the converter tool, then each field is read with its own
//! query-tool invocation. Any nonzero exit aborts before the pipeline touches
//! the store or the repository.

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Version field, `major.minor[...]`
pub const CF_BUNDLE_VERSION: &str = "CFBundleVersion";
/// Reverse-DNS bundle identifier
pub const CF_BUNDLE_IDENTIFIER: &str = "CFBundleIdentifier";
/// Human-readable app name
pub const CF_BUNDLE_DISPLAY_NAME: &str = "CFBundleDisplayName";

/// Metadata read from the application's `Info.plist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
    /// `CFBundleVersion`, e.g. "2.3" or "2.3.17"
    pub bundle_version: String,
    /// `CFBundleIdentifier`, e.g. "com.example.app"
    pub bundle_identifier: String,
    /// `CFBundleDisplayName`
    pub display_name: String,
}

impl BuildMetadata {
    /// The "major.minor" prefix of the bundle version.
    ///
    /// Fails with [`PipelineError::Metadata`] if the version does not have at
    /// least two non-empty dot-separated components.
    pub fn major_minor(&self) -> Result<String> {
        let mut parts = self.bundle_version.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) if !major.is_empty() && !minor.is_empty() => {
                Ok(format!("{}.{}", major, minor))
            }
            _ => Err(PipelineError::Metadata {
                step: CF_BUNDLE_VERSION.to_string(),
                exit_code: None,
                detail: format!(
                    "version {:?} is not of the form major.minor",
                    self.bundle_version
                ),
            }),
        }
    }
}

/// Locations of the plist tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlistTools {
    /// Binary→XML converter (`plutil`)
    pub converter: PathBuf,
    /// Field query tool (`PlistBuddy`)
    pub query: PathBuf,
}

impl Default for PlistTools {
    fn default() -> Self {
        Self {
            converter: PathBuf::from("/usr/bin/plutil"),
            query: PathBuf::from("/usr/libexec/PlistBuddy"),
        }
    }
}

/// Reads [`BuildMetadata`] through external plist tools.
pub struct MetadataParser<'a> {
    runner: &'a dyn CommandRunner,
    tools: &'a PlistTools,
}

impl<'a> MetadataParser<'a> {
    /// Create a parser that runs `tools` through `runner`.
    pub fn new(runner: &'a dyn CommandRunner, tools: &'a PlistTools) -> Self {
        Self { runner, tools }
    }

    /// Normalise `plist` to XML and read the three bundle fields.
    pub async fn parse(&self, plist: &Path) -> Result<BuildMetadata> {
        self.convert_to_xml(plist).await?;

        let bundle_version = self.query(plist, CF_BUNDLE_VERSION).await?;
        let bundle_identifier = self.query(plist, CF_BUNDLE_IDENTIFIER).await?;
        let display_name = self.query(plist, CF_BUNDLE_DISPLAY_NAME).await?;

        log::info!(
            "Read {} {} ({})",
            bundle_identifier,
            bundle_version,
            display_name
        );

        Ok(BuildMetadata {
            bundle_version,
            bundle_identifier,
            display_name,
        })
    }

    async fn convert_to_xml(&self, plist: &Path) -> Result<()> {
        let command = CommandSpec::new(self.tools.converter.to_string_lossy())
            .args(["-convert", "xml1"])
            .path_arg(plist);
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| tool_unavailable("convert", e))?;
        if !output.success() {
            return Err(PipelineError::Metadata {
                step: "convert".to_string(),
                exit_code: output.exit_code,
                detail: format!(
                    "unable to convert Info.plist from binary to xml: {}",
                    output.stderr.trim()
                ),
            });
        }
        Ok(())
    }

    async fn query(&self, plist: &Path, key: &str) -> Result<String> {
        let command = CommandSpec::new(self.tools.query.to_string_lossy())
            .arg("-c")
            .arg(format!("Print {}", key))
            .path_arg(plist);
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| tool_unavailable(key, e))?;
        if !output.success() {
            // PlistBuddy reports missing keys on stdout
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(PipelineError::Metadata {
                step: key.to_string(),
                exit_code: output.exit_code,
                detail,
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

/// A plist tool that cannot be started is a metadata failure for `step`.
fn tool_unavailable(step: &str, error: PipelineError) -> PipelineError {
    match error {
        PipelineError::Spawn { command, error } => PipelineError::Metadata {
            step: step.to_string(),
            exit_code: None,
            detail: format!("cannot run `{}`: {}", command, error),
        },
        other => other,
    }
}
