use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{Edge, EdgeKind, Resource, ResourceGraph};
use serde::Serialize;

use crate::Context;
use crate::cli::GraphArgs;
use crate::ui;

#[derive(Serialize)]
struct GraphDump<'a> {
    codename: &'a str,
    /// Ids in the order a run visits them
    order: Vec<&'a str>,
    nodes: &'a [Resource],
    edges: Vec<Edge>,
}

pub fn run(ctx: &Context, args: GraphArgs) -> Result<()> {
    let loaded = super::load(ctx, args.platform.codename.as_deref())?;
    let graph = &loaded.graph;
    let order: Vec<&str> = graph
        .topological_order()?
        .into_iter()
        .map(|r| r.id.as_str())
        .collect();

    if args.json {
        let dump = GraphDump {
            codename: &loaded.facts.codename,
            order,
            nodes: graph.nodes(),
            edges: graph.edges(),
        };
        let json = serde_json::to_string_pretty(&dump).context("Failed to serialize graph")?;
        println!("{json}");
        return Ok(());
    }

    ui::header(&format!(
        "Resource Graph ({} nodes, codename {})",
        graph.len(),
        super::apply::display_codename(&loaded.facts.codename)
    ));
    for (i, id) in order.iter().enumerate() {
        print_node(graph, i + 1, id);
    }
    Ok(())
}

fn print_node(graph: &ResourceGraph, position: usize, id: &str) {
    let Some(node) = graph.node(id) else {
        return;
    };
    println!(
        "{} {} {}",
        format!("{position:>2}.").dimmed(),
        node.id.bold(),
        format!("[{}]", node.kind).cyan()
    );
    ui::dim(&format!("   {}", node.description()));

    for edge in graph.edges().into_iter().filter(|e| e.from == id) {
        let arrow = match edge.kind {
            EdgeKind::Requires => "requires".yellow(),
            EdgeKind::Notifies => "notifies".magenta(),
            EdgeKind::Precedes => "precedes".blue(),
            EdgeKind::Owns => "owns".dimmed(),
        };
        println!("     {arrow} {}", edge.to);
    }
}
