//! Command runner for guarded commands

use anyhow::{Result, bail};
use declarative::CommandRunner;
use std::path::Path;

use crate::runner;

/// Runs argv directly, output goes to the terminal
#[derive(Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<i32> {
        let Some((program, args)) = argv.split_first() else {
            bail!("Empty command");
        };
        log::info!("Running: {}", argv.join(" "));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        runner::run_status(program, &args, cwd)
    }
}
