use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::state::RunRecord;
use crate::ui;

pub fn run(_ctx: &Context) -> Result<()> {
    let Some(record) = RunRecord::load()? else {
        ui::info(&format!("No run recorded yet ({})", RunRecord::path().display()));
        return Ok(());
    };

    ui::header("Last Apply");
    ui::kv("Started", &record.started.to_rfc3339());
    ui::kv(
        "Duration",
        &format!("{}s", (record.finished - record.started).num_seconds()),
    );
    ui::kv("Codename", super::apply::display_codename(&record.codename));

    let summary = &record.summary;
    ui::kv(
        "Result",
        &format!(
            "{} changed, {} unchanged, {} failed, {} blocked",
            summary.total_changes(),
            summary.no_change,
            summary.failed,
            summary.blocked
        ),
    );

    if !record.changed.is_empty() {
        ui::section("Changed");
        for id in &record.changed {
            println!("  {} {id}", "✓".green());
        }
    }
    if !record.refreshed.is_empty() {
        ui::section("Refreshed");
        for id in &record.refreshed {
            println!("  {} {id}", "↻".cyan());
        }
    }
    if !record.failures.is_empty() {
        ui::section("Failures");
        for (id, reason) in &record.failures {
            println!("  {} {}: {reason}", "✗".red(), id.bold());
        }
    }
    Ok(())
}
