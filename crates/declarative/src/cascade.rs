//! State cascade - derive owned resources' desired state from their package
//!
//! Resources reachable from a package over `Owns` edges follow the package's
//! lifecycle: when the package is absent or purged they are absent too, no
//! matter what they declared. Services are never cascaded.

use crate::error::{GraphError, GraphResult};
use crate::graph::ResourceGraph;
use crate::types::{DesiredState, FileEnsure, PackageEnsure, ResourceKind, ServiceEnsure};
use std::collections::{BTreeMap, BTreeSet};

/// Effective desired state of every node, given the package at `root`
pub fn resolve(graph: &ResourceGraph, root: &str) -> GraphResult<BTreeMap<String, DesiredState>> {
    let root_node = graph.node(root).ok_or_else(|| GraphError::UnknownNode {
        id: root.to_string(),
    })?;
    let DesiredState::Package(package) = &root_node.desired else {
        return Err(GraphError::KindMismatch {
            id: root.to_string(),
            kind: root_node.kind,
        });
    };

    let owned: BTreeSet<&str> = graph.owned_by(root).into_iter().collect();
    let removing = package.ensure.is_removed();

    let resolved = graph
        .nodes()
        .iter()
        .map(|node| {
            let desired = if removing && owned.contains(node.id.as_str()) {
                cascade_absent(&node.id, node.kind, &node.desired)
            } else {
                node.desired.clone()
            };
            (node.id.clone(), desired)
        })
        .collect();

    Ok(resolved)
}

/// Resolve the cascade and install the result into the graph
pub fn apply(graph: &mut ResourceGraph, root: &str) -> GraphResult<()> {
    for (id, desired) in resolve(graph, root)? {
        graph.set_desired(&id, desired)?;
    }
    Ok(())
}

fn cascade_absent(id: &str, kind: ResourceKind, desired: &DesiredState) -> DesiredState {
    match desired {
        DesiredState::File(spec) => {
            let mut spec = spec.clone();
            if kind == ResourceKind::Directory {
                spec.recurse = true;
                spec.force = true;
            }
            spec.ensure = FileEnsure::Absent;
            DesiredState::File(spec)
        }
        other => {
            log::debug!("{id}: {kind} resources have no absent state, leaving as declared");
            other.clone()
        }
    }
}

/// Default service state for a package lifecycle
///
/// Running and enabled, unless the package is being removed and the caller
/// gave neither parameter, in which case stopped and disabled. An explicit
/// parameter always wins on its own.
pub fn service_defaults(
    package: PackageEnsure,
    ensure: Option<ServiceEnsure>,
    enable: Option<bool>,
) -> (ServiceEnsure, bool) {
    let (default_ensure, default_enable) = if package.is_removed() && ensure.is_none() && enable.is_none() {
        (ServiceEnsure::Stopped, false)
    } else {
        (ServiceEnsure::Running, true)
    };
    (ensure.unwrap_or(default_ensure), enable.unwrap_or(default_enable))
}
