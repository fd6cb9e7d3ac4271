use anyhow::Result;

use crate::Context;
use crate::cli::PlatformArgs;
use crate::providers::REQUIRED_TOOLS;
use crate::runner;
use crate::ui;

pub fn run(ctx: &Context, args: PlatformArgs) -> Result<()> {
    ui::header("Configuration Check");

    let loaded = super::load(ctx, args.codename.as_deref())?;
    let config = &loaded.config;

    ui::success(&format!("Configuration valid ({})", ctx.config_path.display()));
    ui::kv("Package", &format!("{} ({})", config.package.name, config.package.ensure));
    match runner::run_capture("dpkg-query", &["-W", "-f=${Version}", &config.package.name]) {
        Ok(version) if !version.is_empty() => ui::kv("Installed", &version),
        _ => ui::kv("Installed", "no"),
    }
    ui::kv("Service", &config.service.name);
    ui::kv("Codename", super::apply::display_codename(&loaded.facts.codename));
    if config.config_file.modes_set() > 1 {
        ui::warn("config_file sets more than one delivery mode; source wins, then content");
    }
    ui::success(&format!(
        "Resource graph valid ({} nodes, {} edges)",
        loaded.graph.len(),
        loaded.graph.edges().len()
    ));

    ui::section("Host tools");
    let mut missing = 0;
    for tool in REQUIRED_TOOLS {
        if runner::command_exists(tool) {
            ui::success(tool);
        } else {
            ui::warn(&format!("{tool} not found"));
            missing += 1;
        }
    }

    println!();
    if missing == 0 {
        ui::success("Ready to apply");
    } else {
        ui::warn(&format!("{missing} tool(s) missing; apply will fail on this host"));
    }
    Ok(())
}
