//! Convergence engine - walks the graph and applies every node once
//!
//! One run is a single sequential topological walk. A node whose requirement
//! failed or was blocked is itself blocked; everything else still converges.

use crate::context::{ApplyContext, ConfirmCallback, NoProgress, ProgressCallback, Providers};
use crate::converge::converger;
use crate::diff::ResourceDiff;
use crate::error::{GraphResult, NodeError};
use crate::graph::ResourceGraph;
use crate::notify::NotificationBus;
use crate::resource::Resource;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary, FailureCause, ResourceKind};
use anyhow::Result;
use serde::Serialize;

/// Outcome of one node in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub id: String,
    pub kind: ResourceKind,
    pub result: ApplyResult,
}

/// Per-node outcomes of a run, in walk order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvergenceReport {
    pub nodes: Vec<NodeReport>,
    /// Pending changes found before applying
    pub diffs: Vec<ResourceDiff>,
    /// Nodes re-applied because something they subscribe to changed
    pub refreshed: Vec<String>,
    pub dry_run: bool,
}

impl ConvergenceReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Outcome of a node, if the walk reached it
    pub fn result(&self, id: &str) -> Option<&ApplyResult> {
        self.nodes.iter().find(|n| n.id == id).map(|n| &n.result)
    }

    /// Ids of nodes that changed the host
    pub fn changed(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.result.is_change())
            .map(|n| n.id.as_str())
            .collect()
    }

    pub fn failures(&self) -> Vec<&NodeReport> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.result, ApplyResult::Failed { .. }))
            .collect()
    }

    pub fn blocked(&self) -> Vec<&NodeReport> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.result, ApplyResult::Blocked { .. }))
            .collect()
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for node in &self.nodes {
            summary.add_result(&node.result);
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.nodes.iter().all(|n| n.result.is_success())
    }
}

/// Applies a [`ResourceGraph`] to the host through a set of providers
pub struct ConvergenceEngine<'a> {
    providers: Providers<'a>,
    options: ExecuteOptions,
    bus: NotificationBus,
}

impl<'a> ConvergenceEngine<'a> {
    pub fn new(providers: Providers<'a>, options: ExecuteOptions) -> Self {
        Self {
            providers,
            options,
            bus: NotificationBus::new(),
        }
    }

    /// Converge the graph; fails only if the graph itself is invalid
    pub fn run(&mut self, graph: &ResourceGraph) -> GraphResult<ConvergenceReport> {
        self.run_with_progress(graph, &mut NoProgress)
    }

    pub fn run_with_progress<P: ProgressCallback>(
        &mut self,
        graph: &ResourceGraph,
        progress: &mut P,
    ) -> GraphResult<ConvergenceReport> {
        let order = graph.topological_order()?;
        self.bus.reset();

        let dry_run = self.options.dry_run;
        let managed = graph.managed_paths();
        let mut ctx = ApplyContext::new(dry_run, self.providers, &managed);
        let mut report = ConvergenceReport::new(dry_run);

        progress.on_batch_start(order.len(), dry_run);
        for node in order {
            progress.on_resource_start(&node.id, &node.description());
            let result = self.converge_node(graph, node, &mut ctx, &mut report);
            progress.on_resource_complete(&node.id, &result);
            report.nodes.push(NodeReport {
                id: node.id.clone(),
                kind: node.kind,
                result,
            });
        }
        progress.on_batch_complete();

        Ok(report)
    }

    fn converge_node(
        &mut self,
        graph: &ResourceGraph,
        node: &Resource,
        ctx: &mut ApplyContext,
        report: &mut ConvergenceReport,
    ) -> ApplyResult {
        if let Some(by) = graph
            .requirements(&node.id)
            .into_iter()
            .find(|req| report.result(req).is_some_and(ApplyResult::blocks_dependents))
        {
            log::warn!("{}: not applied, {by} did not converge", node.id);
            return ApplyResult::Blocked { by: by.to_string() };
        }

        let converge = converger(&node.desired);
        let mut result = match ResourceDiff::from_resource(node, ctx) {
            Err(e) => failure(&node.id, &e),
            Ok(None) => {
                log::debug!("{}: in sync", node.id);
                ApplyResult::NoChange
            }
            Ok(Some(diff)) => {
                report.diffs.push(diff);
                if ctx.dry_run {
                    self.bus.mark_changed(&node.id);
                }
                converge
                    .apply(ctx)
                    .unwrap_or_else(|e| failure(&node.id, &e))
            }
        };

        if result.is_success() && self.bus.take(&node.id) {
            let refreshed = converge
                .refresh(ctx, &result)
                .unwrap_or_else(|e| failure(&node.id, &e));
            // An unchanged result means the refresh had nothing to re-apply
            if refreshed != result {
                if refreshed.is_success() {
                    report.refreshed.push(node.id.clone());
                }
                result = refreshed;
            }
        }

        match &result {
            ApplyResult::Failed { error, .. } => log::error!("{}: {error}", node.id),
            r if r.is_change() => log::info!("{}: {r}", node.id),
            _ => {}
        }

        self.bus.record(&node.id, &result);
        for target in graph.notify_targets(&node.id) {
            self.bus.notify(&node.id, target);
        }
        result
    }
}

fn failure(id: &str, err: &anyhow::Error) -> ApplyResult {
    let error = err
        .downcast_ref::<NodeError>()
        .cloned()
        .unwrap_or_else(|| NodeError::provider(id, err));
    ApplyResult::Failed {
        error: error.to_string(),
        cause: FailureCause::Provider,
    }
}

/// Plan, confirm, then converge
///
/// Returns the dry-run report when `opts.dry_run` is set, when nothing needs
/// to change, or when the confirmation is declined; callers tell those apart
/// by `report.dry_run`.
pub fn execute<P, C>(
    graph: &ResourceGraph,
    providers: Providers<'_>,
    opts: ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ConvergenceReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let plan_opts = ExecuteOptions {
        dry_run: true,
        ..opts.clone()
    };
    let plan = ConvergenceEngine::new(providers, plan_opts).run(graph)?;
    progress.on_plan(&plan.diffs);

    if opts.dry_run || plan.diffs.is_empty() {
        return Ok(plan);
    }

    let prompt = format!("Apply {} change(s)?", plan.diffs.len());
    if !confirm.confirm(&prompt)? {
        return Ok(plan);
    }

    Ok(ConvergenceEngine::new(providers, opts).run_with_progress(graph, progress)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, PackageStatus};
    use crate::error::GraphError;
    use crate::graph::EdgeKind;
    use crate::testing::MemoryHost;
    use crate::types::{
        CommandSpec, ContentSource, DesiredState, FileSpec, PackageEnsure, PackageSpec,
        ServiceEnsure, ServiceSpec,
    };

    const PKI: [(&str, &str, &str); 5] = [
        ("easy-rsa.dir", "cp -r /usr/share/easy-rsa", "/etc/openvpn/easy-rsa"),
        ("dh1024.pem", "./build-dh", "/etc/openvpn/easy-rsa/keys/dh1024.pem"),
        ("ca.key", "./pkitool --initca", "/etc/openvpn/easy-rsa/keys/ca.key"),
        ("server.key", "./pkitool --server server", "/etc/openvpn/easy-rsa/keys/server.key"),
        ("crl.pem", "openssl ca -gencrl", "/etc/openvpn/crl.pem"),
    ];

    /// Package, PKI chain (declared back to front), config file, service
    fn openvpn_graph(conf: &str) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph
            .add_node(
                "openvpn",
                ResourceKind::Package,
                DesiredState::Package(PackageSpec {
                    name: "openvpn".into(),
                    ensure: PackageEnsure::Present,
                }),
            )
            .unwrap();
        for (id, command, creates) in PKI.iter().rev() {
            graph
                .add_node(
                    *id,
                    ResourceKind::GuardedCommand,
                    DesiredState::Command(CommandSpec {
                        command: (*command).into(),
                        creates: (*creates).into(),
                        cwd: None,
                    }),
                )
                .unwrap();
        }
        graph
            .add_node(
                "openvpn.conf",
                ResourceKind::File,
                DesiredState::File(FileSpec::file(
                    "/etc/openvpn/openvpn.conf",
                    ContentSource::Literal(conf.into()),
                )),
            )
            .unwrap();
        graph
            .add_node(
                "service:openvpn",
                ResourceKind::Service,
                DesiredState::Service(ServiceSpec {
                    name: "openvpn".into(),
                    ensure: ServiceEnsure::Running,
                    enable: true,
                }),
            )
            .unwrap();

        graph.add_edge(EdgeKind::Requires, "easy-rsa.dir", "openvpn").unwrap();
        for pair in PKI.windows(2) {
            graph.add_edge(EdgeKind::Requires, pair[1].0, pair[0].0).unwrap();
        }
        graph.add_edge(EdgeKind::Requires, "openvpn.conf", "openvpn").unwrap();
        graph
            .add_edge(EdgeKind::Notifies, "openvpn.conf", "service:openvpn")
            .unwrap();
        graph
            .add_edge(EdgeKind::Requires, "service:openvpn", "openvpn")
            .unwrap();
        graph
    }

    fn host() -> MemoryHost {
        let host = MemoryHost::default();
        for (_, command, creates) in PKI {
            host.on_command(command, creates);
        }
        host
    }

    fn opts() -> ExecuteOptions {
        ExecuteOptions::default()
    }

    #[test]
    fn test_pki_chain_runs_in_order() {
        let host = host();
        let graph = openvpn_graph("port 1194\n");
        let report = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&graph)
            .unwrap();

        assert!(report.is_success());
        let runs = host.runs.lock().unwrap().clone();
        let expected: Vec<String> = PKI.iter().map(|(_, c, _)| (*c).to_string()).collect();
        assert_eq!(runs, expected);
        assert_eq!(report.result("crl.pem"), Some(&ApplyResult::Executed));
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let host = host();
        let graph = openvpn_graph("port 1194\n");
        let providers = Providers::uniform(&host);
        ConvergenceEngine::new(providers, opts()).run(&graph).unwrap();
        host.runs.lock().unwrap().clear();

        let report = ConvergenceEngine::new(providers, opts()).run(&graph).unwrap();
        assert!(report.changed().is_empty());
        assert!(report.diffs.is_empty());
        assert!(host.runs.lock().unwrap().is_empty());
        assert_eq!(host.restarts(), 0);
    }

    #[test]
    fn test_failure_blocks_dependents_only() {
        let host = host();
        host.fail_command("--initca");
        let graph = openvpn_graph("port 1194\n");
        let report = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&graph)
            .unwrap();

        assert!(matches!(
            report.result("ca.key"),
            Some(ApplyResult::Failed {
                cause: FailureCause::Command,
                ..
            })
        ));
        assert_eq!(
            report.result("server.key"),
            Some(&ApplyResult::Blocked { by: "ca.key".into() })
        );
        assert_eq!(
            report.result("crl.pem"),
            Some(&ApplyResult::Blocked {
                by: "server.key".into()
            })
        );
        // Independent nodes still converge
        assert_eq!(report.result("dh1024.pem"), Some(&ApplyResult::Executed));
        assert_eq!(report.result("openvpn.conf"), Some(&ApplyResult::Created));
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.blocked().len(), 2);
        assert!(!report.is_success());

        let runs = host.runs.lock().unwrap();
        assert!(!runs.iter().any(|r| r.contains("--server")));
    }

    #[test]
    fn test_provider_failure_blocks_dependents() {
        let host = host();
        let mut graph = openvpn_graph("port 1194\n");
        // Source file missing on the host
        graph
            .set_desired(
                "openvpn.conf",
                DesiredState::File(FileSpec::file(
                    "/etc/openvpn/openvpn.conf",
                    ContentSource::Source("/srv/missing.conf".into()),
                )),
            )
            .unwrap();
        graph
            .add_node(
                "after-conf",
                ResourceKind::Directory,
                DesiredState::File(FileSpec::directory("/etc/openvpn/ccd")),
            )
            .unwrap();
        graph
            .add_edge(EdgeKind::Requires, "after-conf", "openvpn.conf")
            .unwrap();

        let report = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&graph)
            .unwrap();
        assert!(matches!(
            report.result("openvpn.conf"),
            Some(ApplyResult::Failed {
                cause: FailureCause::Provider,
                ..
            })
        ));
        assert_eq!(
            report.result("after-conf"),
            Some(&ApplyResult::Blocked {
                by: "openvpn.conf".into()
            })
        );
    }

    #[test]
    fn test_changed_conf_restarts_service_once() {
        let host = host();
        let providers = Providers::uniform(&host);
        let graph = openvpn_graph("port 1194\n");
        ConvergenceEngine::new(providers, opts()).run(&graph).unwrap();
        // Brought up from stopped: no restart needed
        assert_eq!(host.restarts(), 0);

        let mut graph = openvpn_graph("port 443\n");
        graph
            .add_node(
                "openvpn.dir",
                ResourceKind::Directory,
                DesiredState::File(FileSpec::directory("/etc/openvpn/ccd")),
            )
            .unwrap();
        graph
            .add_edge(EdgeKind::Notifies, "openvpn.dir", "service:openvpn")
            .unwrap();

        let report = ConvergenceEngine::new(providers, opts()).run(&graph).unwrap();
        assert_eq!(report.result("openvpn.conf"), Some(&ApplyResult::Modified));
        assert_eq!(report.result("openvpn.dir"), Some(&ApplyResult::Created));
        assert_eq!(
            report.result("service:openvpn"),
            Some(&ApplyResult::Refreshed)
        );
        assert_eq!(report.refreshed, ["service:openvpn"]);
        assert_eq!(host.restarts(), 1);
    }

    #[test]
    fn test_refreshed_lists_only_real_restarts() {
        // First converge starts the service, so the config change needs no restart
        let host = host();
        let report = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&openvpn_graph("port 1194\n"))
            .unwrap();
        assert_eq!(report.result("service:openvpn"), Some(&ApplyResult::Created));
        assert!(report.refreshed.is_empty());
        assert_eq!(host.restarts(), 0);

        // A service meant to stay stopped is never restarted
        let host = self::host();
        let mut graph = openvpn_graph("port 1194\n");
        graph
            .set_desired(
                "service:openvpn",
                DesiredState::Service(ServiceSpec {
                    name: "openvpn".into(),
                    ensure: ServiceEnsure::Stopped,
                    enable: false,
                }),
            )
            .unwrap();
        let report = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&graph)
            .unwrap();
        assert_eq!(report.result("openvpn.conf"), Some(&ApplyResult::Created));
        assert_eq!(report.result("service:openvpn"), Some(&ApplyResult::NoChange));
        assert!(report.refreshed.is_empty());
        assert_eq!(host.restarts(), 0);
    }

    #[test]
    fn test_dry_run_would_refresh_only_a_running_service() {
        let dry = ExecuteOptions {
            dry_run: true,
            verbose: false,
        };
        let host = host();
        host.set_package("openvpn", PackageStatus::Installed { outdated: false });
        host.put_file("/etc/openvpn/openvpn.conf", "port 1194\n");

        let report = ConvergenceEngine::new(Providers::uniform(&host), dry.clone())
            .run(&openvpn_graph("port 443\n"))
            .unwrap();
        assert!(report.refreshed.is_empty());

        host.set_service("openvpn", true, true);
        let report = ConvergenceEngine::new(Providers::uniform(&host), dry)
            .run(&openvpn_graph("port 443\n"))
            .unwrap();
        assert_eq!(report.refreshed, ["service:openvpn"]);
        assert_eq!(host.restarts(), 0);
    }

    #[test]
    fn test_unchanged_conf_does_not_restart() {
        let host = host();
        host.set_package("openvpn", PackageStatus::Installed { outdated: false });
        host.set_service("openvpn", true, true);
        host.put_file("/etc/openvpn/openvpn.conf", "port 1194\n");

        let report = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&openvpn_graph("port 1194\n"))
            .unwrap();
        assert_eq!(report.result("openvpn.conf"), Some(&ApplyResult::NoChange));
        assert_eq!(report.result("service:openvpn"), Some(&ApplyResult::NoChange));
        assert_eq!(host.restarts(), 0);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let host = host();
        let report = ConvergenceEngine::new(
            Providers::uniform(&host),
            ExecuteOptions {
                dry_run: true,
                verbose: false,
            },
        )
        .run(&openvpn_graph("port 1194\n"))
        .unwrap();

        assert!(report.dry_run);
        assert!(!report.diffs.is_empty());
        assert!(host.log.lock().unwrap().is_empty());
        assert!(
            report
                .nodes
                .iter()
                .all(|n| matches!(n.result, ApplyResult::Skipped { .. }))
        );
    }

    #[test]
    fn test_execute_respects_confirmation() {
        let host = host();
        let graph = openvpn_graph("port 1194\n");
        let providers = Providers::uniform(&host);

        let declined =
            execute(&graph, providers, opts(), &mut NoProgress, &mut AutoDecline).unwrap();
        assert!(declined.dry_run);
        assert!(host.log.lock().unwrap().is_empty());

        let applied =
            execute(&graph, providers, opts(), &mut NoProgress, &mut AutoConfirm).unwrap();
        assert!(!applied.dry_run);
        assert!(applied.is_success());
        assert_eq!(applied.summary().executed, PKI.len());
    }

    #[test]
    fn test_cycle_is_rejected_before_running() {
        let host = host();
        let mut graph = openvpn_graph("port 1194\n");
        graph
            .add_edge(EdgeKind::Precedes, "crl.pem", "dh1024.pem")
            .unwrap();

        let err = ConvergenceEngine::new(Providers::uniform(&host), opts())
            .run(&graph)
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
        assert!(host.log.lock().unwrap().is_empty());
    }
}
