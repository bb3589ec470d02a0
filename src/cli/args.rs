//! Command line argument parsing and validation.

use clap::Parser;
use std::path::PathBuf;

/// Lengths of a full SHA-1 and SHA-256 object id.
const FULL_SHA_LENGTHS: [usize; 2] = [40, 64];

/// Over-the-air publisher for iOS builds
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_ota",
    version,
    about = "Publishes an .ipa for over-the-air install and bumps the project build number",
    long_about = "Publishes an .ipa to an object store with an install manifest and index page, then bumps, commits, tags and pushes the project build number.

Usage:
  kodegen_bundler_ota --ipa build/App.ipa --branch beta --commit 3f2a9c1d4e5f60718293a4b5c6d7e8f901234567
  kodegen_bundler_ota -c ci/ota.toml --ipa App.ipa --branch main --commit $GIT_COMMIT

Exit codes:
  0 = published (or this version was already published)
  1 = error
  2 = published, but the branch moved so the repository was not bumped"
)]
pub struct Args {
    /// Configuration file
    #[arg(
        short,
        long,
        value_name = "PATH",
        env = "OTA_CONFIG",
        default_value = crate::config::DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// The .ipa to publish
    #[arg(short, long, value_name = "PATH")]
    pub ipa: PathBuf,

    /// Branch the build was made from
    #[arg(short, long, value_name = "BRANCH", env = "OTA_BRANCH")]
    pub branch: String,

    /// Full commit SHA the build was made from
    ///
    /// The repository is only bumped if the branch head still equals this
    /// commit after pulling. Abbreviated SHAs are rejected because the head
    /// is compared against the full `git rev-parse HEAD` output.
    #[arg(long, value_name = "SHA", env = "OTA_COMMIT")]
    pub commit: String,

    /// Token for the commit status API
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Print every stage detail
    #[arg(short, long)]
    pub verbose: bool,

    /// Print only warnings and the final result
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.branch.trim().is_empty() {
            return Err("Branch cannot be empty".to_string());
        }

        let commit = self.commit.trim();
        if commit.is_empty() {
            return Err("Commit cannot be empty".to_string());
        }
        if !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("Invalid commit: {}. Expected a hex SHA", commit));
        }
        if !FULL_SHA_LENGTHS.contains(&commit.len()) {
            return Err(format!(
                "Invalid commit: {}. Expected the full 40-character SHA (64 for SHA-256 repositories)",
                commit
            ));
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    /// Print warning message
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    /// Print success message if not in quiet mode
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMIT: &str = "3f2a9c1d4e5f60718293a4b5c6d7e8f901234567";

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["kodegen_bundler_ota", "--ipa", "App.ipa", "--branch", "beta"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn parses_required_flags() {
        let args = parse(&["--commit", COMMIT]).unwrap();
        assert_eq!(args.ipa, PathBuf::from("App.ipa"));
        assert_eq!(args.branch, "beta");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn rejects_non_hex_commit() {
        let args = parse(&["--commit", "HEAD~1"]).unwrap();
        assert!(args.validate().unwrap_err().contains("HEAD~1"));
    }

    #[test]
    fn abbreviated_commit_never_reaches_the_guard() {
        let args = parse(&["--commit", "3f2a9c1"]).unwrap();
        assert!(args.validate().unwrap_err().contains("full 40-character"));

        let sha256 = "a".repeat(64);
        assert!(parse(&["--commit", &sha256]).unwrap().validate().is_ok());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(parse(&["--commit", "abc", "-v", "-q"]).is_err());
    }
}
