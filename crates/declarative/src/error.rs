//! Error types for graph construction and node application.
//!
//! Graph errors are fatal: a graph that fails to build or validate is never
//! executed. Node errors are recorded per node in the convergence report and
//! never abort a run.

use crate::types::ResourceKind;

/// Result type alias for graph construction.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or validating a resource graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node with the same id was already added.
    #[error("duplicate resource id: {id}")]
    DuplicateId {
        /// The offending id.
        id: String,
    },

    /// An edge or lookup referenced a node that does not exist.
    #[error("unknown resource: {id}")]
    UnknownNode {
        /// The missing id.
        id: String,
    },

    /// The desired state does not belong to the declared kind.
    #[error("desired state for {id} does not fit kind {kind}")]
    KindMismatch {
        /// Node id.
        id: String,
        /// Declared kind.
        kind: ResourceKind,
    },

    /// Ordering edges form a cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle {
        /// Node ids taking part in the cycle, first id repeated at the end.
        path: Vec<String>,
    },
}

/// Errors recorded against a single node during a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// A package, service or filesystem provider failed.
    #[error("{resource}: {message}")]
    Provider {
        /// Resource id.
        resource: String,
        /// Provider error text.
        message: String,
    },

    /// A guarded command returned a non-zero exit or could not be spawned.
    #[error("command `{command}` failed: {status}")]
    Command {
        /// Command line.
        command: String,
        /// Exit status or spawn failure text.
        status: String,
    },

    /// A template could not be rendered.
    #[error("cannot render {path}: {message}")]
    Render {
        /// Template path.
        path: String,
        /// Render failure text.
        message: String,
    },
}

impl NodeError {
    /// Build a provider error from any displayable failure.
    pub fn provider(resource: &str, err: impl std::fmt::Display) -> Self {
        Self::Provider {
            resource: resource.to_string(),
            message: format!("{err:#}"),
        }
    }
}
