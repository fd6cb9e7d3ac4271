//! Resource graph - typed nodes and directed edges
//!
//! The graph is filled once while building a manifest and then handed to the
//! engine by shared reference; nothing mutates it during a run.
//!
//! Ordering edges (`Requires`, `Precedes`, `Notifies`) must form a DAG.
//! `Owns` edges carry no ordering and are only read by the state cascade.

use crate::error::{GraphError, GraphResult};
use crate::resource::Resource;
use crate::types::{DesiredState, ResourceKind};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;

/// Relationship between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// `from` is applied only after `to` converged; `to` failing blocks `from`
    Requires,
    /// `from` changing forces `to` to be re-applied (and orders `from` first)
    Notifies,
    /// `from` is applied before `to`, nothing else
    Precedes,
    /// `from` owns `to`; `to` follows `from`'s lifecycle
    Owns,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requires => "requires",
            Self::Notifies => "notifies",
            Self::Precedes => "precedes",
            Self::Owns => "owns",
        })
    }
}

/// An edge as seen from outside the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeRef {
    kind: EdgeKind,
    from: usize,
    to: usize,
}

impl EdgeRef {
    /// (before, after) pair if this edge constrains ordering
    fn ordering(&self) -> Option<(usize, usize)> {
        match self.kind {
            EdgeKind::Requires => Some((self.to, self.from)),
            EdgeKind::Notifies | EdgeKind::Precedes => Some((self.from, self.to)),
            EdgeKind::Owns => None,
        }
    }
}

/// Directed graph of resources describing the desired end state of a host
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<Resource>,
    index: HashMap<String, usize>,
    edges: Vec<EdgeRef>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; ids are unique and the state must fit the kind
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        kind: ResourceKind,
        desired: DesiredState,
    ) -> GraphResult<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateId { id });
        }
        if !desired.fits(kind) {
            return Err(GraphError::KindMismatch { id, kind });
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Resource::new(id, kind, desired));
        Ok(())
    }

    /// Add an edge between two existing nodes
    pub fn add_edge(&mut self, kind: EdgeKind, from: &str, to: &str) -> GraphResult<()> {
        let edge = EdgeRef {
            kind,
            from: self.position(from)?,
            to: self.position(to)?,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Replace a node's desired state (build phase only)
    pub fn set_desired(&mut self, id: &str, desired: DesiredState) -> GraphResult<()> {
        let pos = self.position(id)?;
        let node = &mut self.nodes[pos];
        if !desired.fits(node.kind) {
            return Err(GraphError::KindMismatch {
                id: id.to_string(),
                kind: node.kind,
            });
        }
        node.desired = desired;
        Ok(())
    }

    /// Check that ordering edges are acyclic
    pub fn validate(&self) -> GraphResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Nodes in dependency order
    ///
    /// Among nodes with no ordering constraint between them, declaration order
    /// wins, so the walk is deterministic.
    pub fn topological_order(&self) -> GraphResult<Vec<&Resource>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (before, after) in self.edges.iter().filter_map(EdgeRef::ordering) {
            successors[before].push(after);
            in_degree[after] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < n {
            let remaining: Vec<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
            return Err(GraphError::Cycle {
                path: self.find_cycle(&remaining, &successors),
            });
        }

        Ok(order.into_iter().map(|i| &self.nodes[i]).collect())
    }

    /// Walk successors among the nodes Kahn could not place until one repeats
    fn find_cycle(&self, remaining: &[usize], successors: &[Vec<usize>]) -> Vec<String> {
        let stuck: BTreeSet<usize> = remaining.iter().copied().collect();
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            // Every stuck node has a stuck predecessor, so walk predecessors
            // backwards; reversing the walk yields the forward cycle.
            let Some(prev) = (0..successors.len())
                .find(|&p| stuck.contains(&p) && successors[p].contains(&current))
            else {
                break;
            };
            if let Some(pos) = path.iter().position(|&p| p == prev) {
                let mut cycle: Vec<usize> = path[pos..].to_vec();
                cycle.reverse();
                cycle.push(cycle[0]);
                return cycle.iter().map(|&i| self.nodes[i].id.clone()).collect();
            }
            path.push(prev);
            current = prev;
        }

        remaining.iter().map(|&i| self.nodes[i].id.clone()).collect()
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> &[Resource] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All edges in insertion order
    pub fn edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|e| Edge {
                kind: e.kind,
                from: self.nodes[e.from].id.clone(),
                to: self.nodes[e.to].id.clone(),
            })
            .collect()
    }

    /// Ids that `id` requires
    pub fn requirements(&self, id: &str) -> Vec<&str> {
        self.targets(id, EdgeKind::Requires)
    }

    /// Ids that `id` notifies when it changes
    pub fn notify_targets(&self, id: &str) -> Vec<&str> {
        self.targets(id, EdgeKind::Notifies)
    }

    /// Ids owned by `id`, directly or transitively, in discovery order
    pub fn owned_by(&self, id: &str) -> Vec<&str> {
        let Some(&root) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen = BTreeSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut owned = Vec::new();

        while let Some(current) = queue.pop_front() {
            for edge in &self.edges {
                if edge.kind == EdgeKind::Owns && edge.from == current && seen.insert(edge.to) {
                    owned.push(self.nodes[edge.to].id.as_str());
                    queue.push_back(edge.to);
                }
            }
        }
        owned
    }

    /// Every filesystem path some node manages or creates
    pub fn managed_paths(&self) -> BTreeSet<PathBuf> {
        self.nodes
            .iter()
            .filter_map(|n| n.desired.path().cloned())
            .collect()
    }

    fn targets(&self, id: &str, kind: EdgeKind) -> Vec<&str> {
        let Some(&from) = self.index.get(id) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|e| e.kind == kind && e.from == from)
            .map(|e| self.nodes[e.to].id.as_str())
            .collect()
    }

    fn position(&self, id: &str) -> GraphResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode { id: id.to_string() })
    }
}
