//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Output;
use std::str::FromStr;

/// The fixed resource vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Package,
    Directory,
    File,
    Symlink,
    GuardedCommand,
    Service,
}

impl ResourceKind {
    /// Short name used in ids, filters and diff grouping
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Symlink => "symlink",
            Self::GuardedCommand => "exec",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired package lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageEnsure {
    #[default]
    Present,
    Latest,
    Absent,
    Purged,
}

impl PackageEnsure {
    /// Whether the package should end up installed
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Present | Self::Latest)
    }

    /// Whether the package and everything it owns should be removed
    pub fn is_removed(&self) -> bool {
        !self.is_installed()
    }
}

impl fmt::Display for PackageEnsure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Latest => "latest",
            Self::Absent => "absent",
            Self::Purged => "purged",
        })
    }
}

impl FromStr for PackageEnsure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" | "installed" => Ok(Self::Present),
            "latest" => Ok(Self::Latest),
            "absent" => Ok(Self::Absent),
            "purged" => Ok(Self::Purged),
            other => Err(format!(
                "invalid package ensure '{other}' (expected present, latest, absent or purged)"
            )),
        }
    }
}

/// Desired service run state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceEnsure {
    #[default]
    Running,
    Stopped,
}

impl fmt::Display for ServiceEnsure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

impl FromStr for ServiceEnsure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" | "true" => Ok(Self::Running),
            "stopped" | "false" => Ok(Self::Stopped),
            other => Err(format!(
                "invalid service ensure '{other}' (expected running or stopped)"
            )),
        }
    }
}

/// Desired filesystem object state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEnsure {
    Present,
    Absent,
    Directory,
    Link,
}

impl fmt::Display for FileEnsure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Directory => "directory",
            Self::Link => "link",
        })
    }
}

/// Where a file's content comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Only existence is managed
    #[default]
    Unmanaged,
    /// Literal content string
    Literal(String),
    /// Copy of another file (or directory tree, for directories)
    Source(PathBuf),
    /// Template file rendered with an option set
    Template {
        path: PathBuf,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
}

impl ContentSource {
    /// External source reference, if any
    pub fn source(&self) -> Option<&PathBuf> {
        match self {
            Self::Source(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_managed(&self) -> bool {
        !matches!(self, Self::Unmanaged)
    }
}

/// Package desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub ensure: PackageEnsure,
}

/// Service desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub ensure: ServiceEnsure,
    pub enable: bool,
}

/// File, directory or symlink desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    pub ensure: FileEnsure,
    #[serde(default)]
    pub content: ContentSource,
    /// Link target (symlinks only)
    #[serde(default)]
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub recurse: bool,
    #[serde(default)]
    pub purge: bool,
    #[serde(default)]
    pub force: bool,
}

impl FileSpec {
    /// A plain file
    pub fn file(path: impl Into<PathBuf>, content: ContentSource) -> Self {
        Self {
            path: path.into(),
            ensure: FileEnsure::Present,
            content,
            target: None,
            recurse: false,
            purge: false,
            force: false,
        }
    }

    /// A directory without a source tree
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            ensure: FileEnsure::Directory,
            ..Self::file(path, ContentSource::Unmanaged)
        }
    }

    /// A symlink at `path` pointing to `target`
    pub fn link(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            ensure: FileEnsure::Link,
            target: Some(target.into()),
            ..Self::file(path, ContentSource::Unmanaged)
        }
    }
}

/// Command guarded by the existence of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Shell command line
    pub command: String,
    /// Guard path; the command is satisfied once this exists
    pub creates: PathBuf,
    /// Working directory
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Desired state of a node, polymorphic per kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesiredState {
    Package(PackageSpec),
    Service(ServiceSpec),
    File(FileSpec),
    Command(CommandSpec),
}

impl DesiredState {
    /// Whether this state is valid for the given kind
    pub fn fits(&self, kind: ResourceKind) -> bool {
        match (kind, self) {
            (ResourceKind::Package, Self::Package(_))
            | (ResourceKind::Service, Self::Service(_))
            | (ResourceKind::GuardedCommand, Self::Command(_)) => true,
            (ResourceKind::File, Self::File(f)) => {
                matches!(f.ensure, FileEnsure::Present | FileEnsure::Absent)
            }
            (ResourceKind::Directory, Self::File(f)) => {
                matches!(f.ensure, FileEnsure::Directory | FileEnsure::Absent)
            }
            (ResourceKind::Symlink, Self::File(f)) => {
                matches!(f.ensure, FileEnsure::Link | FileEnsure::Absent)
                    && (f.ensure == FileEnsure::Absent || f.target.is_some())
            }
            _ => false,
        }
    }

    /// Filesystem path managed by this state, if any
    ///
    /// A guarded command manages the artifact it creates.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::File(f) => Some(&f.path),
            Self::Command(c) => Some(&c.creates),
            _ => None,
        }
    }

    /// Short human-readable ensure value
    pub fn ensure_label(&self) -> String {
        match self {
            Self::Package(p) => p.ensure.to_string(),
            Self::Service(s) => format!(
                "{} ({})",
                s.ensure,
                if s.enable { "enabled" } else { "disabled" }
            ),
            Self::File(f) => f.ensure.to_string(),
            Self::Command(c) => format!("creates {}", c.creates.display()),
        }
    }
}

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub(crate) fn present(details: impl Into<String>) -> Self {
        Self::Present {
            details: Some(details.into()),
        }
    }
}

/// What went wrong when a node failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// Package, service or filesystem provider failure
    Provider,
    /// Guarded command exited non-zero
    Command,
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Guarded command ran
    Executed,
    /// Resource was re-applied because something it subscribes to changed
    Refreshed,
    /// Apply was skipped
    Skipped { reason: String },
    /// Apply failed
    Failed { error: String, cause: FailureCause },
    /// Not attempted because a requirement failed or was blocked
    Blocked { by: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. } | Self::Blocked { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Removed | Self::Executed | Self::Refreshed
        )
    }

    /// Whether dependents of this node must be blocked
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Blocked { .. })
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => f.write_str("unchanged"),
            Self::Created => f.write_str("created"),
            Self::Modified => f.write_str("modified"),
            Self::Removed => f.write_str("removed"),
            Self::Executed => f.write_str("executed"),
            Self::Refreshed => f.write_str("refreshed"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Failed { error, .. } => write!(f, "failed: {error}"),
            Self::Blocked { by } => write!(f, "blocked by {by}"),
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub executed: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub blocked: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed + self.executed + self.refreshed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.blocked == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.blocked + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Executed => self.executed += 1,
            ApplyResult::Refreshed => self.refreshed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Blocked { .. } => self.blocked += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
}

/// Output from a provider command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
