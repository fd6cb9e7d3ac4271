use anyhow::{Context, Result};
use declarative::CommandOutput;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a command with extra environment, capturing output whatever the exit code
pub fn run_output(cmd: &str, args: &[&str], env: &[(&str, &str)]) -> Result<CommandOutput> {
    log::debug!("Running: {} {}", cmd, args.join(" "));
    let output = Command::new(cmd)
        .args(args)
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
    Ok(output.into())
}

/// Run a command with inherited stdio, returning its exit code
///
/// A command killed by a signal reports -1.
pub fn run_status(cmd: &str, args: &[&str], cwd: Option<&Path>) -> Result<i32> {
    let mut command = Command::new(cmd);
    command.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    let status = command
        .status()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
    Ok(status.code().unwrap_or(-1))
}

/// Run a command silently, returning success/failure
pub fn run_quiet(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_capture_trims_stdout() {
        assert_eq!(run_capture("echo", &["  hello "]).unwrap(), "hello");
        assert!(run_capture("false", &[]).is_err());
    }

    #[test]
    fn test_run_output_keeps_failures() {
        let output = run_output("sh", &["-c", "echo \"$X\"; exit 3"], &[("X", "set")]).unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout_str().trim(), "set");
    }

    #[test]
    fn test_run_status_uses_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        assert_eq!(run_status("test", &["-f", "marker"], Some(dir.path())).unwrap(), 0);
        assert_eq!(run_status("test", &["-f", "marker"], None).unwrap(), 1);
    }

    #[test]
    fn test_run_quiet() {
        assert!(run_quiet("true", &[]));
        assert!(!run_quiet("false", &[]));
        assert!(!run_quiet("definitely-not-a-command-12345", &[]));
    }
}
