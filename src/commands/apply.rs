use anyhow::{Result, bail};
use chrono::Utc;
use declarative::ExecuteOptions;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine;
use crate::providers::Host;
use crate::state::RunRecord;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let loaded = super::load(ctx, args.platform.codename.as_deref())?;

    if !ctx.quiet {
        ui::header("OpenVPN Provisioning");
        ui::kv("Config", &ctx.config_path.display().to_string());
        ui::kv("Codename", display_codename(&loaded.facts.codename));
        ui::kv("Resources", &loaded.graph.len().to_string());
    }

    if !args.dry_run && !is_root() {
        ui::warn("Not running as root; package, service and /etc changes will likely fail");
    }

    let host = Host::default();
    let started = Utc::now();
    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        verbose: ctx.verbose > 0,
    };
    let report = engine::execute(&loaded.graph, host.providers(), opts, args.yes)?;

    if report.dry_run {
        return Ok(());
    }

    let record = RunRecord::from_report(&report, &loaded.facts.codename, started);
    if let Err(e) = record.save() {
        log::warn!("Failed to save run record: {e:#}");
    }

    if !report.is_success() {
        bail!(
            "{} resource(s) failed, {} blocked",
            report.failures().len(),
            report.blocked().len()
        );
    }
    Ok(())
}

pub fn display_codename(codename: &str) -> &str {
    if codename.is_empty() { "(unknown)" } else { codename }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}
