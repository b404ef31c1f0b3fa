//! In-memory fakes for the command executor (testing only)
//!
//! `RecordingExecutor` records every command instead of running it. All
//! commands succeed unless a failure rule matches.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::command::{CommandExecutor, CommandOutput, CommandSpec};
use crate::error::StepError;

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

struct FailureRule {
    matcher: Matcher,
    exit_code: i32,
    stderr: String,
}

/// Executor that records commands and fakes their results.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Vec<FailureRule>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands matching `matcher` exit with `exit_code` and `stderr`.
    pub fn fail_when<F>(mut self, matcher: F, exit_code: i32, stderr: &str) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.failures.push(FailureRule {
            matcher: Box::new(matcher),
            exit_code,
            stderr: stderr.to_string(),
        });
        self
    }

    /// Commands whose program is `program` fail with exit code 1.
    pub fn fail_program(self, program: &str, stderr: &str) -> Self {
        let program = program.to_string();
        self.fail_when(move |spec| spec.program == program, 1, stderr)
    }

    /// Every command received so far.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Received commands rendered as shell lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput, StepError> {
        self.calls.lock().unwrap().push(command.clone());

        let (exit_code, stderr) = self
            .failures
            .iter()
            .find(|rule| (rule.matcher)(command))
            .map(|rule| (rule.exit_code, rule.stderr.clone()))
            .unwrap_or((0, String::new()));

        Ok(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr,
            duration_ms: 0,
        })
    }
}
