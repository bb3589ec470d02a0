//! In-memory stand-ins for the pipeline's external capabilities.
//!
//! [`RecordingRunner`] answers commands from a script and records every
//! invocation; [`RecordingStatusReporter`] records reported commits. Paired
//! with [`MemoryObjectStore`](crate::store::MemoryObjectStore) they let the
//! whole pipeline run without `git`, Xcode tools or a network.

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{PipelineError, Result};
use crate::repository::StatusReporter;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug)]
struct Rule {
    program: String,
    prefix: Vec<String>,
    responses: VecDeque<CommandOutput>,
}

impl Rule {
    fn matches(&self, command: &CommandSpec) -> bool {
        command.program_name() == self.program
            && command.arguments().len() >= self.prefix.len()
            && command
                .arguments()
                .iter()
                .zip(&self.prefix)
                .all(|(arg, expected)| arg == expected)
    }

    /// Pop the next scripted response; the last one repeats forever.
    fn next_response(&mut self) -> CommandOutput {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap_or_else(|| CommandOutput::ok(""))
        } else {
            self.responses
                .front()
                .cloned()
                .unwrap_or_else(|| CommandOutput::ok(""))
        }
    }
}

/// Scripted [`CommandRunner`] that records every command it is asked to run.
///
/// Commands match rules by program file name and argument prefix; the
/// longest matching prefix wins. Unmatched commands succeed with empty
/// output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    rules: Mutex<Vec<Rule>>,
    missing: Vec<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `program <prefix...>` with `output`, replacing any earlier rule
    /// for the same program and prefix.
    pub fn respond(self, program: &str, prefix: &[&str], output: CommandOutput) -> Self {
        self.respond_sequence(program, prefix, vec![output])
    }

    /// Answer successive matching calls with `outputs` in order; the last
    /// output repeats once the others are used up.
    pub fn respond_sequence(
        self,
        program: &str,
        prefix: &[&str],
        outputs: Vec<CommandOutput>,
    ) -> Self {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        {
            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            rules.retain(|rule| !(rule.program == program && rule.prefix == prefix));
            rules.push(Rule {
                program: program.to_string(),
                prefix,
                responses: outputs.into(),
            });
        }
        self
    }

    /// Fail every run of `program` as if it were not installed.
    pub fn without_program(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Commands run for `program` (matched by file name).
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|call| call.program_name() == program)
            .collect()
    }

    /// Whether `program <prefix...>` was run at least once.
    pub fn ran(&self, program: &str, prefix: &[&str]) -> bool {
        self.calls_to(program).iter().any(|call| {
            call.arguments().len() >= prefix.len()
                && call.arguments().iter().zip(prefix).all(|(a, p)| a == p)
        })
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.clone());

        if self.missing.iter().any(|p| p == command.program_name()) {
            return Err(PipelineError::Spawn {
                command: command.to_string(),
                error: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }

        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let output = rules
            .iter_mut()
            .filter(|rule| rule.matches(command))
            .max_by_key(|rule| rule.prefix.len())
            .map_or_else(|| CommandOutput::ok(""), Rule::next_response);
        Ok(output)
    }
}

/// [`StatusReporter`] that records reported commits.
#[derive(Debug, Default)]
pub struct RecordingStatusReporter {
    reported: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every report with `message` (the commit is still recorded).
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reported: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    /// Commits passed to [`StatusReporter::report_success`].
    pub fn reported(&self) -> Vec<String> {
        self.reported.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingStatusReporter {
    async fn report_success(&self, commit: &str) -> Result<()> {
        self.reported
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(commit.to_string());
        match &self.failure {
            Some(message) => Err(PipelineError::StatusApi(message.clone())),
            None => Ok(()),
        }
    }
}
