//! Apply context and provider traits
//!
//! These traits allow the declarative crate to be used without
//! depending on specific package managers, init systems, or terminals.

use crate::diff::ResourceDiff;
use crate::types::{ApplyResult, ServiceEnsure};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Installed state of a package as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    /// Installed; `outdated` when a newer candidate is available
    Installed { outdated: bool },
    /// Removed, but configuration files remain
    ConfigOnly,
    /// Not installed at all
    NotInstalled,
}

/// Which version to install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageVersion {
    /// Whatever satisfies "installed"
    Any,
    /// The newest available candidate
    Latest,
}

/// Package manager collaborator
pub trait PackageProvider: Send + Sync {
    /// Query the installed state of a package
    fn status(&self, name: &str) -> Result<PackageStatus>;

    /// Install or upgrade a package
    fn install(&self, name: &str, version: PackageVersion) -> Result<()>;

    /// Remove a package, optionally purging its configuration files
    fn remove(&self, name: &str, purge_config: bool) -> Result<()>;
}

/// Observed state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub enabled: bool,
}

/// Init system collaborator
pub trait ServiceProvider: Send + Sync {
    /// Query whether a service is running and enabled at boot
    fn status(&self, name: &str) -> Result<ServiceStatus>;

    /// Bring a service to the given run state and boot-enable flag
    fn set_state(&self, name: &str, ensure: ServiceEnsure, enable: bool) -> Result<()>;

    /// Restart a running service
    fn restart(&self, name: &str) -> Result<()>;
}

/// Filesystem collaborator
pub trait FilesystemProvider: Send + Sync {
    /// Whether anything (file, directory, or symlink, even dangling) exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory (following symlinks)
    fn is_dir(&self, path: &Path) -> bool;

    /// Read a file; `None` if it does not exist
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Write a file, creating parent directories
    fn write(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Create a directory and its parents
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Remove a file, symlink or directory
    fn remove(&self, path: &Path, recursive: bool) -> Result<()>;

    /// Create a symlink at `path` pointing to `target`, replacing an existing link
    fn symlink(&self, path: &Path, target: &Path) -> Result<()>;

    /// Target of the symlink at `path`; `None` if `path` is not a symlink
    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>>;

    /// Regular files below `root`, relative to it, sorted
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>>;

    /// Content digest of a regular file; `None` if it does not exist
    fn digest(&self, path: &Path) -> Result<Option<String>> {
        Ok(self
            .read(path)?
            .map(|bytes| blake3::hash(&bytes).to_hex().to_string()))
    }
}

/// External command collaborator
pub trait CommandRunner: Send + Sync {
    /// Run `argv` in `cwd` and return its exit code
    ///
    /// Blocks until the command exits; there is no timeout.
    fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<i32>;
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called with the pending changes found by the planning pass
    fn on_plan(&mut self, _diffs: &[ResourceDiff]) {}

    /// Called once before the walk with the number of nodes
    fn on_batch_start(&mut self, count: usize, dry_run: bool);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when the walk completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize, _dry_run: bool) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// The set of host collaborators a run works through
#[derive(Clone, Copy)]
pub struct Providers<'a> {
    pub packages: &'a dyn PackageProvider,
    pub services: &'a dyn ServiceProvider,
    pub fs: &'a dyn FilesystemProvider,
    pub runner: &'a dyn CommandRunner,
}

impl<'a> Providers<'a> {
    /// All four collaborators backed by a single host value
    pub fn uniform<H>(host: &'a H) -> Self
    where
        H: PackageProvider + ServiceProvider + FilesystemProvider + CommandRunner,
    {
        Self {
            packages: host,
            services: host,
            fs: host,
            runner: host,
        }
    }
}

/// Context passed to resource apply operations
pub struct ApplyContext<'a> {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Host collaborators
    pub providers: Providers<'a>,
    /// Paths managed by some node; directory purges never touch them
    pub managed_paths: &'a BTreeSet<PathBuf>,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(
        dry_run: bool,
        providers: Providers<'a>,
        managed_paths: &'a BTreeSet<PathBuf>,
    ) -> Self {
        Self {
            dry_run,
            providers,
            managed_paths,
        }
    }

    pub fn fs(&self) -> &'a dyn FilesystemProvider {
        self.providers.fs
    }
}
