pub mod apply;
pub mod check;
pub mod graph;
pub mod last;
pub mod plan;

use anyhow::{Context as AnyhowContext, Result};
use declarative::ResourceGraph;

use crate::Context;
use crate::config::ProvisionConfig;
use crate::facts::PlatformFacts;
use crate::manifest;

/// Configuration, facts and the graph built from them
pub struct Loaded {
    pub config: ProvisionConfig,
    pub facts: PlatformFacts,
    pub graph: ResourceGraph,
}

/// Load and validate the configuration, gather facts, build the graph
pub fn load(ctx: &Context, codename: Option<&str>) -> Result<Loaded> {
    let config = ProvisionConfig::load(&ctx.config_path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", ctx.config_path.display()))?;

    let facts = PlatformFacts::gather(codename, &config);
    let graph = manifest::build(&config, &facts)?;

    Ok(Loaded {
        config,
        facts,
        graph,
    })
}
