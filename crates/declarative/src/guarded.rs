//! Guarded command execution
//!
//! A guarded command runs only while its `creates` artifact is missing. Once
//! the artifact exists the command is considered satisfied and never runs
//! again. The artifact's content is not inspected.

use crate::context::{CommandRunner, FilesystemProvider};
use crate::types::CommandSpec;

/// Outcome of one guarded command application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Guard path already exists; the command did not run
    Skipped,
    /// The command ran and exited 0
    Executed,
    /// The command could not be run or exited non-zero
    Failed { reason: String },
}

/// Runs commands behind an existence check
pub struct GuardedCommandExecutor<'a> {
    fs: &'a dyn FilesystemProvider,
    runner: &'a dyn CommandRunner,
}

impl<'a> GuardedCommandExecutor<'a> {
    pub fn new(fs: &'a dyn FilesystemProvider, runner: &'a dyn CommandRunner) -> Self {
        Self { fs, runner }
    }

    /// Whether the command is already satisfied
    pub fn is_satisfied(&self, spec: &CommandSpec) -> bool {
        self.fs.exists(&spec.creates)
    }

    /// Run `spec` unless its guard path exists
    pub fn apply(&self, spec: &CommandSpec) -> GuardOutcome {
        if self.is_satisfied(spec) {
            log::debug!(
                "{} exists, not running `{}`",
                spec.creates.display(),
                spec.command
            );
            return GuardOutcome::Skipped;
        }

        log::info!("Running `{}`", spec.command);
        let argv = shell_argv(&spec.command);
        match self.runner.run(&argv, spec.cwd.as_deref()) {
            Ok(0) => GuardOutcome::Executed,
            Ok(code) => GuardOutcome::Failed {
                reason: format!("exited with status {code}"),
            },
            Err(e) => GuardOutcome::Failed {
                reason: format!("{e:#}"),
            },
        }
    }
}

/// Guarded commands are shell lines (they source `./vars` and chain with `&&`)
pub fn shell_argv(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}
