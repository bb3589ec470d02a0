//! Command line interface for the OTA publisher.
//!
//! Parses arguments, loads `ota.toml`, wires the real collaborators (system
//! commands, configured object store, status API) into a
//! [`Pipeline`](crate::pipeline::Pipeline) and turns its outcome into an exit
//! code.

mod args;
mod output;

pub use args::{Args, RuntimeConfig};
pub use output::OutputManager;

use crate::command::SystemCommandRunner;
use crate::config::Config;
use crate::error::{CliError, PipelineError};
use crate::pipeline::{Pipeline, PipelineOutcome, PipelineRequest};
use crate::publish::{PublishReceipt, TemplateSet};
use anyhow::Context as _;

/// Published, or already published.
pub const EXIT_SUCCESS: i32 = 0;
/// Any pipeline error.
pub const EXIT_FAILURE: i32 = 1;
/// Artifact published but the repository was left untouched.
pub const EXIT_BUMP_SKIPPED: i32 = 2;

/// Main CLI entry point
pub async fn run() -> anyhow::Result<i32> {
    let args = Args::parse_args();
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;
    let runtime = RuntimeConfig::from(&args);
    execute(&args, &runtime).await
}

/// Run the pipeline for already parsed arguments.
pub async fn execute(args: &Args, runtime: &RuntimeConfig) -> anyhow::Result<i32> {
    let config = Config::load(&args.config)
        .await
        .with_context(|| format!("loading configuration {}", args.config.display()))?;
    let store = config.object_store()?;
    let status = config.status_reporter(args.github_token.clone())?;
    let templates = TemplateSet::load(
        config.templates.manifest.as_deref(),
        config.templates.index.as_deref(),
    )
    .await
    .context("loading templates")?;

    runtime.section(&format!("Publishing {}", args.ipa.display()))?;
    runtime.verbose_println(&format!(
        "   branch {} at {}, store {}",
        args.branch,
        args.commit,
        store.container_name()
    ))?;

    let request = PipelineRequest {
        artifact_path: args.ipa.clone(),
        branch: args.branch.clone(),
        expected_commit: args.commit.trim().to_string(),
    };
    let runner = SystemCommandRunner;
    let output = runtime.output();
    runtime.progress(&format!("Using {}", args.config.display()))?;
    let result = Pipeline::new(&config, &runner, status.as_ref(), &templates)
        .with_store(store.as_ref())
        .with_progress(output)
        .run(&request)
        .await;

    match result {
        Ok(outcome) => {
            report(runtime, &outcome)?;
            Ok(exit_code(&outcome))
        }
        Err(e) => {
            output.error(&failure_message(&e))?;
            Ok(EXIT_FAILURE)
        }
    }
}

/// Exit code for a finished run.
pub fn exit_code(outcome: &PipelineOutcome) -> i32 {
    match outcome {
        PipelineOutcome::Published { .. } | PipelineOutcome::AlreadyPublished { .. } => {
            EXIT_SUCCESS
        }
        PipelineOutcome::BumpSkipped { .. } => EXIT_BUMP_SKIPPED,
    }
}

/// Final error line; command failures already lead with their stage.
pub fn failure_message(error: &PipelineError) -> String {
    match error {
        PipelineError::Command { .. } => error.to_string(),
        other => format!("{} failed: {}", other.stage(), other),
    }
}

fn report(runtime: &RuntimeConfig, outcome: &PipelineOutcome) -> std::io::Result<()> {
    match outcome {
        PipelineOutcome::Published {
            version,
            receipt,
            new_head,
            tag,
            status_warning,
        } => {
            report_receipt(runtime, receipt)?;
            if let Some(tag) = tag {
                runtime.indent(&format!("tag       {}", tag))?;
            }
            match status_warning {
                Some(warning) => {
                    runtime.warn(warning)?;
                    runtime.warn(&format!(
                        "Published {} and pushed {}, but the commit status was not reported",
                        version, new_head
                    ))
                }
                None => runtime.success(&format!("Published {} and pushed {}", version, new_head)),
            }
        }
        PipelineOutcome::AlreadyPublished {
            title,
            manifest_key,
        } => runtime.success(&format!(
            "{} is already published ({}); nothing to do",
            title, manifest_key
        )),
        PipelineOutcome::BumpSkipped {
            version,
            receipt,
            expected,
            current,
        } => {
            report_receipt(runtime, receipt)?;
            runtime.warn(&format!(
                "Published {} but the branch moved ({} -> {}); repository not bumped",
                version, expected, current
            ))
        }
    }
}

fn report_receipt(runtime: &RuntimeConfig, receipt: &PublishReceipt) -> std::io::Result<()> {
    runtime.indent(&format!("artifact  {}", receipt.artifact_url))?;
    runtime.indent(&format!("sha256    {}", receipt.checksum))?;
    if let Some(url) = &receipt.manifest_url {
        runtime.indent(&format!("manifest  {}", url))?;
    }
    if let Some(url) = &receipt.index_url {
        runtime.indent(&format!("index     {}", url))?;
    }
    for warning in &receipt.warnings {
        runtime.warn(warning)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ResolvedVersion;

    fn receipt() -> PublishReceipt {
        PublishReceipt {
            artifact_url: "u".into(),
            checksum: "c".into(),
            manifest_url: None,
            index_url: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn exit_codes_follow_outcome() {
        let published = PipelineOutcome::Published {
            version: ResolvedVersion::new("1.0", 0),
            receipt: receipt(),
            new_head: "h".into(),
            tag: None,
            status_warning: Some("no token".into()),
        };
        let already = PipelineOutcome::AlreadyPublished {
            title: "t".into(),
            manifest_key: "k".into(),
        };
        let skipped = PipelineOutcome::BumpSkipped {
            version: ResolvedVersion::new("1.0", 0),
            receipt: receipt(),
            expected: "a".into(),
            current: "b".into(),
        };

        assert_eq!(exit_code(&published), EXIT_SUCCESS);
        assert_eq!(exit_code(&already), EXIT_SUCCESS);
        assert_eq!(exit_code(&skipped), EXIT_BUMP_SKIPPED);
    }

    #[test]
    fn command_failures_name_their_stage_once() {
        let push = PipelineError::Command {
            stage: "push".into(),
            command: "git push origin main --tags".into(),
            exit_code: Some(1),
            stderr: "rejected".into(),
        };
        let message = failure_message(&push);
        assert!(message.starts_with("push failed: `git push"));
        assert_eq!(message.matches("push failed").count(), 1);

        let missing = PipelineError::NotFound {
            what: "artifact App.ipa".into(),
        };
        assert_eq!(failure_message(&missing), "preflight failed: Not found: artifact App.ipa");
    }
}
