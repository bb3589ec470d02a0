//! External process execution.
//!
//! Every local tool the pipeline touches (`plutil`, `PlistBuddy`, `agvtool`,
//! `git`) goes through a [`CommandRunner`], so tests can substitute a scripted
//! runner and assert on exactly which commands were issued.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// A command line to execute: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Start a command for `program` (a bare name or an absolute path).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Run inside `dir` instead of the current directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program as given.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// File name of the program, so `/usr/bin/plutil` and `plutil` compare equal.
    pub fn program_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program)
    }

    /// Arguments in order.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if one was set.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True when the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a nonzero exit into [`PipelineError::Command`] tagged with `stage`.
    pub fn check(self, stage: &str, command: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(PipelineError::Command {
                stage: stage.to_string(),
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Capability to run an external command to completion.
///
/// Implementations block (asynchronously) until the process exits. A process
/// that starts and exits nonzero is reported through [`CommandOutput`], not as
/// an error; only a failure to start the process at all is an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` and capture its output.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("Running: {}", command);

        // Resolve bare names up front so a missing tool reads as such
        let program = if Path::new(command.program()).is_absolute() {
            PathBuf::from(command.program())
        } else {
            which::which(command.program()).map_err(|e| PipelineError::Spawn {
                command: command.to_string(),
                error: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
            })?
        };

        let mut process = tokio::process::Command::new(&program);
        process
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.cwd() {
            process.current_dir(dir);
        }

        let output = process.output().await.map_err(|error| PipelineError::Spawn {
            command: command.to_string(),
            error,
        })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            log::debug!(
                "`{}` exited with {:?}: {}",
                command,
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = CommandSpec::new("/usr/libexec/PlistBuddy")
            .arg("-c")
            .arg("Print CFBundleVersion")
            .arg("Info.plist");
        assert_eq!(
            cmd.to_string(),
            "/usr/libexec/PlistBuddy -c \"Print CFBundleVersion\" Info.plist"
        );
        assert_eq!(cmd.program_name(), "PlistBuddy");
    }

    #[test]
    fn check_maps_nonzero_exit_to_command_error() {
        let cmd = CommandSpec::new("git").args(["push", "origin", "main"]);
        let err = CommandOutput::failed(128, "  rejected\n")
            .check("push", &cmd)
            .unwrap_err();
        match err {
            PipelineError::Command {
                stage,
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(stage, "push");
                assert_eq!(command, "git push origin main");
                assert_eq!(exit_code, Some(128));
                assert_eq!(stderr, "rejected");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_captures_exit_status_and_output() {
        let runner = SystemCommandRunner;
        let ok = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, Some(3));
        assert_eq!(failed.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn system_runner_reports_missing_tool_as_spawn_error() {
        let err = SystemCommandRunner
            .run(&CommandSpec::new("definitely-not-a-real-tool-ota"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}
