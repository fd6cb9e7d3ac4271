//! # Declarative
//!
//! A graph-based convergence engine for host provisioning.
//!
//! This crate provides the core abstractions for declaring desired state,
//! detecting current state, and converging a host to match it in dependency
//! order.
//!
//! ## Core Concepts
//!
//! - **Resource**: A node with an id, a kind and a desired state
//! - **ResourceGraph**: Nodes plus `requires`/`precedes`/`notifies`/`owns` edges
//! - **Cascade**: Derives owned resources' state from their package's lifecycle
//! - **GuardedCommandExecutor**: Runs a command until its artifact exists
//! - **ConvergenceEngine**: Walks the graph once and reports every node's outcome
//! - **NotificationBus**: Forces one refresh of nodes notified by a changed node
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ConvergenceEngine, DesiredState, EdgeKind, ExecuteOptions, PackageEnsure,
//!     PackageSpec, Providers, ResourceGraph, ResourceKind,
//! };
//!
//! let mut graph = ResourceGraph::new();
//! graph.add_node(
//!     "openvpn",
//!     ResourceKind::Package,
//!     DesiredState::Package(PackageSpec { name: "openvpn".into(), ensure: PackageEnsure::Present }),
//! )?;
//! // ... more nodes and edges
//! graph.validate()?;
//!
//! let providers = Providers { packages: &apt, services: &systemd, fs: &local_fs, runner: &shell };
//! let report = ConvergenceEngine::new(providers, ExecuteOptions::default()).run(&graph)?;
//! for failure in report.failures() {
//!     eprintln!("{}: {}", failure.id, failure.result);
//! }
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`PackageProvider`]: Installs and removes packages
//! - [`ServiceProvider`]: Starts, stops, enables and restarts services
//! - [`FilesystemProvider`]: Reads and writes files, directories and symlinks
//! - [`CommandRunner`]: Runs external commands
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific package managers, init systems, UI frameworks, etc.

pub mod cascade;
pub mod context;
pub mod converge;
pub mod diff;
pub mod engine;
pub mod error;
pub mod graph;
pub mod guarded;
pub mod notify;
pub mod resource;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, CommandRunner, ConfirmCallback, FilesystemProvider,
    NoProgress, PackageProvider, PackageStatus, PackageVersion, ProgressCallback, Providers,
    ServiceProvider, ServiceStatus,
};
pub use converge::{Converge, converger};
pub use diff::{DiffSummary, ResourceDiff, group_by_kind};
pub use engine::{ConvergenceEngine, ConvergenceReport, NodeReport, execute};
pub use error::{GraphError, GraphResult, NodeError};
pub use graph::{Edge, EdgeKind, ResourceGraph};
pub use guarded::{GuardOutcome, GuardedCommandExecutor};
pub use notify::NotificationBus;
pub use resource::Resource;
pub use types::{
    ApplyResult, CommandOutput, CommandSpec, ContentSource, DesiredState, ExecuteOptions,
    ExecuteSummary, FailureCause, FileEnsure, FileSpec, PackageEnsure, PackageSpec, ResourceKind,
    ResourceState, ServiceEnsure, ServiceSpec,
};
