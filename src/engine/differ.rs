//! Diff display

use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceState, group_by_kind};

fn group_title(kind: &str) -> &str {
    match kind {
        "package" => "Packages",
        "service" => "Services",
        "file" => "Files",
        "directory" => "Directories",
        "symlink" => "Symlinks",
        "exec" => "Commands",
        other => other,
    }
}

fn state_label(state: &ResourceState) -> String {
    match state {
        ResourceState::Present { details } => details.clone().unwrap_or_else(|| "present".into()),
        ResourceState::Absent => "absent".into(),
        ResourceState::Modified { from, to } => format!("{from} → {to}"),
        ResourceState::Unknown => "unknown".into(),
    }
}

/// One-line change description for a diff
fn describe(diff: &ResourceDiff) -> String {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, desired) => format!("(missing) → {}", state_label(desired)),
        (_, ResourceState::Absent) => "(will remove)".to_string(),
        (current, desired) => format!("{} → {}", state_label(current), state_label(desired)),
    }
}

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff], show_detail: bool) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", group_title(kind).bold());

        for diff in kind_diffs {
            let symbol = if diff.is_addition() {
                "+".green()
            } else if diff.is_removal() {
                "-".red()
            } else {
                "~".yellow()
            };

            println!(
                "│   {} {:<30} {}",
                symbol,
                diff.resource_id,
                describe(diff).dimmed()
            );

            if show_detail {
                if let Some(detail) = &diff.detail {
                    for line in detail.lines() {
                        println!("│       {}", color_diff_line(line));
                    }
                }
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to add, {} to change, {} to remove)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn color_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.dimmed().to_string()
    }
}
