use anyhow::Result;
use declarative::{ConvergenceEngine, ExecuteOptions};

use crate::Context;
use crate::cli::PlatformArgs;
use crate::engine::display_diff;
use crate::providers::Host;
use crate::ui;

pub fn run(ctx: &Context, args: PlatformArgs) -> Result<()> {
    let loaded = super::load(ctx, args.codename.as_deref())?;

    let host = Host::default();
    let opts = ExecuteOptions {
        dry_run: true,
        verbose: ctx.verbose > 0,
    };
    let report = ConvergenceEngine::new(host.providers(), opts).run(&loaded.graph)?;

    display_diff(&report.diffs, true);

    for node in report.failures() {
        ui::error(&format!("{}: {}", node.id, node.result));
    }
    if !report.refreshed.is_empty() {
        println!();
        ui::info(&format!("Would refresh: {}", report.refreshed.join(", ")));
    }
    Ok(())
}
