//! Resource nodes
//!
//! A Resource is one unit of desired state in the graph: an id that is unique
//! within the graph, the kind of thing it manages, and the state it should
//! converge to.

use crate::types::{DesiredState, ResourceKind};
use serde::{Deserialize, Serialize};

/// A node in the resource graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable name, unique within the graph (e.g. "openvpn", "ca.key")
    pub id: String,
    /// What kind of resource this is
    pub kind: ResourceKind,
    /// Where the resource should end up
    pub desired: DesiredState,
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: ResourceKind, desired: DesiredState) -> Self {
        Self {
            id: id.into(),
            kind,
            desired,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match &self.desired {
            DesiredState::Package(p) => format!("Package {} ({})", p.name, p.ensure),
            DesiredState::Service(s) => format!(
                "Service {} ({}, {})",
                s.name,
                s.ensure,
                if s.enable { "enabled" } else { "disabled" }
            ),
            DesiredState::File(f) => match (&f.target, self.kind) {
                (Some(target), crate::types::ResourceKind::Symlink) => {
                    format!("Symlink {} -> {}", f.path.display(), target.display())
                }
                _ => format!("{} {} ({})", capitalize(self.kind.as_str()), f.path.display(), f.ensure),
            },
            DesiredState::Command(c) => format!("Exec {} (creates {})", self.id, c.creates.display()),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
