//! Terminal front end for a convergence run

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyResult, ConfirmCallback, ConvergenceReport, ExecuteOptions, ExecuteSummary,
    ProgressCallback, Providers, ResourceDiff, ResourceGraph,
};
use indicatif::{ProgressBar, ProgressStyle};

use super::differ::display_diff;

/// Diff display and a progress bar for the apply pass
pub struct TerminalProgress {
    bar: Option<ProgressBar>,
    show_detail: bool,
    verbose: bool,
}

impl TerminalProgress {
    pub fn new(show_detail: bool, verbose: bool) -> Self {
        Self {
            bar: None,
            show_detail,
            verbose,
        }
    }
}

fn result_symbol(result: &ApplyResult) -> colored::ColoredString {
    match result {
        ApplyResult::NoChange => "○".dimmed(),
        ApplyResult::Failed { .. } => "✗".red(),
        ApplyResult::Blocked { .. } => "⊘".red(),
        ApplyResult::Skipped { .. } => "⊘".yellow(),
        _ => "✓".green(),
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_plan(&mut self, diffs: &[ResourceDiff]) {
        display_diff(diffs, self.show_detail);
    }

    fn on_batch_start(&mut self, count: usize, _dry_run: bool) {
        println!();
        println!("  {} Converging {} resources...", "→".cyan(), count);

        let bar = ProgressBar::new(count as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let Some(bar) = &self.bar else {
            return;
        };
        let worth_a_line = self.verbose || result.is_change() || !result.is_success();
        if worth_a_line && !matches!(result, ApplyResult::NoChange) {
            bar.println(format!("    {} {} {}", result_symbol(result), id, result));
        }
        bar.inc(1);
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Ask on the terminal unless `--yes` was given
pub struct DialoguerConfirm {
    pub yes: bool,
}

impl ConfirmCallback for DialoguerConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Show the plan, confirm, converge, and print the outcome
pub fn execute(
    graph: &ResourceGraph,
    providers: Providers<'_>,
    opts: ExecuteOptions,
    yes: bool,
) -> Result<ConvergenceReport> {
    let dry_run = opts.dry_run;
    let mut progress = TerminalProgress::new(opts.verbose || dry_run, opts.verbose);
    let mut confirm = DialoguerConfirm { yes };

    let report = declarative::execute(graph, providers, opts, &mut progress, &mut confirm)?;

    if report.dry_run {
        if dry_run {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        } else if !report.diffs.is_empty() {
            println!();
            println!("  {} Aborted", "✗".red());
        }
        return Ok(report);
    }

    print_summary(&report.summary());
    print_failures(&report);
    Ok(report)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    for (count, label) in [
        (summary.created, "created"),
        (summary.modified, "modified"),
        (summary.removed, "removed"),
        (summary.executed, "commands executed"),
        (summary.refreshed, "refreshed"),
        (summary.skipped, "skipped"),
    ] {
        if count > 0 {
            println!("    • {count} {label}");
        }
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
    if summary.blocked > 0 {
        println!("    • {} {}", summary.blocked, "blocked".red());
    }
}

fn print_failures(report: &ConvergenceReport) {
    let failed: Vec<_> = report.failures().into_iter().chain(report.blocked()).collect();
    if failed.is_empty() {
        return;
    }

    println!();
    for node in failed {
        println!("    {} {}: {}", result_symbol(&node.result), node.id.bold(), node.result);
    }
}
