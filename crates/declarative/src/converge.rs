//! Per-kind convergence
//!
//! Every desired state knows how to observe the host, describe where it wants
//! the host to be, and move it there. The shape follows the classic resource
//! contract:
//! - State detection (current vs desired)
//! - Apply function (converge current -> desired)
//! - Refresh (re-apply when something this resource subscribes to changed)

use crate::context::{ApplyContext, PackageStatus, PackageVersion};
use crate::error::NodeError;
use crate::guarded::{GuardOutcome, GuardedCommandExecutor};
use crate::template;
use crate::types::{
    ApplyResult, CommandSpec, ContentSource, DesiredState, FailureCause, FileEnsure, FileSpec,
    PackageEnsure, PackageSpec, ResourceState, ServiceEnsure, ServiceSpec,
};
use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Core convergence contract, implemented for every desired-state type
pub trait Converge {
    /// Detect the current state on the host
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState>;

    /// The state the host should be in
    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState>;

    /// Apply changes to reach the desired state
    ///
    /// Implementations re-check the host, honour `ctx.dry_run`, and return
    /// `NoChange` when nothing had to be done.
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;

    /// Re-apply after a notification; `applied` is this run's apply result
    fn refresh(&self, _ctx: &mut ApplyContext, applied: &ApplyResult) -> Result<ApplyResult> {
        Ok(applied.clone())
    }

    /// Extra human-readable detail for a pending change (e.g. a text diff)
    fn detail(&self, _ctx: &ApplyContext) -> Option<String> {
        None
    }
}

/// Pick the convergence implementation for a desired state
pub fn converger(desired: &DesiredState) -> &dyn Converge {
    match desired {
        DesiredState::Package(spec) => spec,
        DesiredState::Service(spec) => spec,
        DesiredState::File(spec) => spec,
        DesiredState::Command(spec) => spec,
    }
}

fn dry_run_skip() -> ApplyResult {
    ApplyResult::Skipped {
        reason: "Dry run".to_string(),
    }
}

/// Short digest used to compare and display content
fn digest_label(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    format!("blake3:{}", &hex[..12])
}

// ============================================================================
// Package
// ============================================================================

impl Converge for PackageSpec {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let status = ctx.providers.packages.status(&self.name)?;
        Ok(match status {
            PackageStatus::Installed { outdated: true } if self.ensure == PackageEnsure::Latest => {
                ResourceState::Modified {
                    from: "outdated".to_string(),
                    to: "latest".to_string(),
                }
            }
            PackageStatus::Installed { .. } => ResourceState::Present { details: None },
            PackageStatus::ConfigOnly if self.ensure == PackageEnsure::Purged => {
                ResourceState::present("configuration files remain")
            }
            PackageStatus::ConfigOnly | PackageStatus::NotInstalled => ResourceState::Absent,
        })
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(if self.ensure.is_installed() {
            ResourceState::Present { details: None }
        } else {
            ResourceState::Absent
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(dry_run_skip());
        }

        let packages = ctx.providers.packages;
        let status = packages.status(&self.name)?;
        let installed = matches!(status, PackageStatus::Installed { .. });

        match (self.ensure, status) {
            (PackageEnsure::Present, _) if !installed => {
                packages.install(&self.name, PackageVersion::Any)?;
                Ok(ApplyResult::Created)
            }
            (PackageEnsure::Latest, _) if !installed => {
                packages.install(&self.name, PackageVersion::Latest)?;
                Ok(ApplyResult::Created)
            }
            (PackageEnsure::Latest, PackageStatus::Installed { outdated: true }) => {
                packages.install(&self.name, PackageVersion::Latest)?;
                Ok(ApplyResult::Modified)
            }
            (PackageEnsure::Absent, PackageStatus::Installed { .. }) => {
                packages.remove(&self.name, false)?;
                Ok(ApplyResult::Removed)
            }
            (PackageEnsure::Purged, PackageStatus::Installed { .. } | PackageStatus::ConfigOnly) => {
                packages.remove(&self.name, true)?;
                Ok(ApplyResult::Removed)
            }
            _ => Ok(ApplyResult::NoChange),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

fn service_label(running: bool, enabled: bool) -> ResourceState {
    ResourceState::present(format!(
        "{}, {}",
        if running { "running" } else { "stopped" },
        if enabled { "enabled" } else { "disabled" }
    ))
}

impl Converge for ServiceSpec {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let status = ctx.providers.services.status(&self.name)?;
        Ok(service_label(status.running, status.enabled))
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(service_label(self.ensure == ServiceEnsure::Running, self.enable))
    }

    /// Returns `Created` when the service was brought up from stopped,
    /// `Modified` for any other transition
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(dry_run_skip());
        }

        let services = ctx.providers.services;
        let before = services.status(&self.name)?;
        let want_running = self.ensure == ServiceEnsure::Running;
        if before.running == want_running && before.enabled == self.enable {
            return Ok(ApplyResult::NoChange);
        }

        services.set_state(&self.name, self.ensure, self.enable)?;
        if want_running && !before.running {
            Ok(ApplyResult::Created)
        } else {
            Ok(ApplyResult::Modified)
        }
    }

    /// Restart a running service once; a service started during this run
    /// already picked up the new configuration
    fn refresh(&self, ctx: &mut ApplyContext, applied: &ApplyResult) -> Result<ApplyResult> {
        if self.ensure != ServiceEnsure::Running {
            log::debug!("{} is not meant to run, not restarting", self.name);
            return Ok(applied.clone());
        }
        if matches!(applied, ApplyResult::Created) {
            return Ok(applied.clone());
        }
        if ctx.dry_run {
            // A stopped service would be started by apply, not restarted
            if !ctx.providers.services.status(&self.name)?.running {
                return Ok(applied.clone());
            }
            return Ok(ApplyResult::Skipped {
                reason: "Dry run (would restart)".to_string(),
            });
        }

        log::info!("Restarting service {}", self.name);
        ctx.providers
            .services
            .restart(&self.name)
            .with_context(|| format!("Failed to restart {}", self.name))?;
        Ok(ApplyResult::Refreshed)
    }
}

// ============================================================================
// Guarded command
// ============================================================================

impl Converge for CommandSpec {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(if ctx.fs().exists(&self.creates) {
            ResourceState::present(self.creates.display().to_string())
        } else {
            ResourceState::Absent
        })
    }

    fn desired_state(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(ResourceState::present(self.creates.display().to_string()))
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(dry_run_skip());
        }

        let executor = GuardedCommandExecutor::new(ctx.providers.fs, ctx.providers.runner);
        Ok(match executor.apply(self) {
            GuardOutcome::Skipped => ApplyResult::NoChange,
            GuardOutcome::Executed => ApplyResult::Executed,
            GuardOutcome::Failed { reason } => ApplyResult::Failed {
                error: NodeError::Command {
                    command: self.command.clone(),
                    status: reason,
                }
                .to_string(),
                cause: FailureCause::Command,
            },
        })
    }
}

// ============================================================================
// File, directory, symlink
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum SymlinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileExists,
}

/// Files a directory sync has to copy or purge, relative to the directory
#[derive(Debug, Default)]
struct SyncPlan {
    copy: Vec<PathBuf>,
    purge: Vec<PathBuf>,
}

impl SyncPlan {
    fn is_empty(&self) -> bool {
        self.copy.is_empty() && self.purge.is_empty()
    }

    fn len(&self) -> usize {
        self.copy.len() + self.purge.len()
    }
}

/// Purge never touches a path another node manages, or anything beneath one
fn spared(ctx: &ApplyContext, root: &Path, path: &Path) -> bool {
    ctx.managed_paths
        .iter()
        .any(|managed| managed != root && path.starts_with(managed))
}

impl FileSpec {
    /// Resolve managed content; `None` when content is unmanaged
    fn resolve_content(&self, ctx: &ApplyContext) -> Result<Option<Vec<u8>>> {
        let fs = ctx.fs();
        match &self.content {
            ContentSource::Unmanaged => Ok(None),
            ContentSource::Literal(text) => Ok(Some(text.clone().into_bytes())),
            ContentSource::Source(source) => fs
                .read(source)?
                .map(Some)
                .ok_or_else(|| anyhow!("Source does not exist: {}", source.display())),
            ContentSource::Template { path, options } => {
                let raw = fs
                    .read(path)?
                    .ok_or_else(|| anyhow!("Template does not exist: {}", path.display()))?;
                let text = String::from_utf8(raw)
                    .with_context(|| format!("Template is not UTF-8: {}", path.display()))?;
                let rendered = template::render(&text, options).map_err(|missing| {
                    NodeError::Render {
                        path: path.display().to_string(),
                        message: format!("unknown keys: {}", missing.join(", ")),
                    }
                })?;
                Ok(Some(rendered.into_bytes()))
            }
        }
    }

    fn resolve_link(&self, link: &Path) -> PathBuf {
        if link.is_absolute() {
            link.to_path_buf()
        } else {
            self.path
                .parent()
                .map_or_else(|| link.to_path_buf(), |p| p.join(link))
        }
    }

    fn target(&self) -> Result<&PathBuf> {
        self.target
            .as_ref()
            .ok_or_else(|| anyhow!("Symlink {} has no target", self.path.display()))
    }

    fn check_symlink(&self, ctx: &ApplyContext) -> Result<SymlinkState> {
        let fs = ctx.fs();
        if !fs.exists(&self.path) {
            return Ok(SymlinkState::Missing);
        }
        match fs.read_link(&self.path)? {
            Some(actual) => {
                let actual = self.resolve_link(&actual);
                if actual == self.resolve_link(self.target()?) {
                    Ok(SymlinkState::Correct)
                } else {
                    Ok(SymlinkState::WrongTarget(actual))
                }
            }
            None => Ok(SymlinkState::FileExists),
        }
    }

    fn sync_plan(&self, ctx: &ApplyContext) -> Result<SyncPlan> {
        let Some(source) = self.content.source().filter(|_| self.recurse) else {
            return Ok(SyncPlan::default());
        };
        let fs = ctx.fs();
        if !fs.is_dir(source) {
            bail!("Source directory does not exist: {}", source.display());
        }

        let wanted = fs.walk(source)?;
        let target = &self.path;
        let copy = wanted
            .par_iter()
            .map(|rel| -> Result<Option<PathBuf>> {
                let from = fs.digest(&source.join(rel))?;
                let to = fs.digest(&target.join(rel))?;
                Ok((from != to).then(|| rel.clone()))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let mut purge = Vec::new();
        if self.purge && fs.is_dir(target) {
            let keep: BTreeSet<&PathBuf> = wanted.iter().collect();
            purge = fs
                .walk(target)?
                .into_iter()
                .filter(|rel| !keep.contains(rel) && !spared(ctx, target, &target.join(rel)))
                .collect();
        }

        Ok(SyncPlan { copy, purge })
    }

    fn apply_file(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let fs = ctx.fs();
        if fs.is_dir(&self.path) {
            if !self.force {
                bail!("{} is a directory, not replacing it", self.path.display());
            }
            fs.remove(&self.path, true)?;
        }

        let existing = fs.read(&self.path)?;
        let Some(content) = self.resolve_content(ctx)? else {
            if existing.is_some() {
                return Ok(ApplyResult::NoChange);
            }
            fs.write(&self.path, &[])?;
            return Ok(ApplyResult::Created);
        };

        match existing {
            None => {
                fs.write(&self.path, &content)?;
                Ok(ApplyResult::Created)
            }
            Some(current) if current != content => {
                fs.write(&self.path, &content)?;
                Ok(ApplyResult::Modified)
            }
            Some(_) => Ok(ApplyResult::NoChange),
        }
    }

    fn apply_directory(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let fs = ctx.fs();
        let mut result = ApplyResult::NoChange;

        if fs.exists(&self.path) && !fs.is_dir(&self.path) {
            if !self.force {
                bail!("{} exists and is not a directory", self.path.display());
            }
            fs.remove(&self.path, false)?;
        }
        if !fs.is_dir(&self.path) {
            fs.create_dir(&self.path)?;
            result = ApplyResult::Created;
        }

        let plan = self.sync_plan(ctx)?;
        if plan.is_empty() {
            return Ok(result);
        }
        // sync_plan only yields entries when a source is set
        let source = self.content.source().map_or(&self.path, |s| s);
        for rel in &plan.copy {
            let bytes = fs
                .read(&source.join(rel))?
                .ok_or_else(|| anyhow!("Source file vanished: {}", source.join(rel).display()))?;
            fs.write(&self.path.join(rel), &bytes)?;
        }
        for rel in &plan.purge {
            log::info!("Purging unmanaged {}", self.path.join(rel).display());
            fs.remove(&self.path.join(rel), false)?;
        }

        if result == ApplyResult::NoChange {
            result = ApplyResult::Modified;
        }
        Ok(result)
    }

    fn apply_symlink(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let fs = ctx.fs();
        let target = self.target()?;
        match self.check_symlink(ctx)? {
            SymlinkState::Correct => Ok(ApplyResult::NoChange),
            SymlinkState::Missing => {
                fs.symlink(&self.path, target)?;
                Ok(ApplyResult::Created)
            }
            SymlinkState::WrongTarget(_) => {
                fs.symlink(&self.path, target)?;
                Ok(ApplyResult::Modified)
            }
            SymlinkState::FileExists if self.force => {
                fs.remove(&self.path, true)?;
                fs.symlink(&self.path, target)?;
                Ok(ApplyResult::Modified)
            }
            // Don't overwrite existing files automatically
            SymlinkState::FileExists => Ok(ApplyResult::Skipped {
                reason: format!("File exists at {}", self.path.display()),
            }),
        }
    }

    fn apply_absent(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let fs = ctx.fs();
        if !fs.exists(&self.path) {
            return Ok(ApplyResult::NoChange);
        }
        fs.remove(&self.path, self.force)?;
        Ok(ApplyResult::Removed)
    }
}

impl Converge for FileSpec {
    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let fs = ctx.fs();
        match self.ensure {
            FileEnsure::Absent => Ok(if fs.exists(&self.path) {
                ResourceState::present("exists")
            } else {
                ResourceState::Absent
            }),
            FileEnsure::Present => {
                if fs.is_dir(&self.path) {
                    return Ok(ResourceState::Modified {
                        from: "directory".to_string(),
                        to: "file".to_string(),
                    });
                }
                Ok(match fs.read(&self.path)? {
                    None => ResourceState::Absent,
                    Some(bytes) if self.content.is_managed() => {
                        ResourceState::present(digest_label(&bytes))
                    }
                    Some(_) => ResourceState::Present { details: None },
                })
            }
            FileEnsure::Directory => {
                if !fs.exists(&self.path) {
                    return Ok(ResourceState::Absent);
                }
                if !fs.is_dir(&self.path) {
                    return Ok(ResourceState::Modified {
                        from: "file".to_string(),
                        to: "directory".to_string(),
                    });
                }
                let plan = self.sync_plan(ctx)?;
                if plan.is_empty() {
                    Ok(ResourceState::present("directory"))
                } else {
                    Ok(ResourceState::Modified {
                        from: format!("{} file(s) out of sync", plan.len()),
                        to: "in sync with source".to_string(),
                    })
                }
            }
            FileEnsure::Link => Ok(match self.check_symlink(ctx)? {
                SymlinkState::Missing => ResourceState::Absent,
                SymlinkState::Correct => {
                    ResourceState::present(format!("-> {}", self.target()?.display()))
                }
                SymlinkState::WrongTarget(actual) => ResourceState::Modified {
                    from: actual.display().to_string(),
                    to: self.target()?.display().to_string(),
                },
                SymlinkState::FileExists => ResourceState::Modified {
                    from: "regular file".to_string(),
                    to: format!("symlink -> {}", self.target()?.display()),
                },
            }),
        }
    }

    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        match self.ensure {
            FileEnsure::Absent => Ok(ResourceState::Absent),
            FileEnsure::Present => Ok(match self.resolve_content(ctx)? {
                Some(bytes) => ResourceState::present(digest_label(&bytes)),
                None => ResourceState::Present { details: None },
            }),
            FileEnsure::Directory => Ok(ResourceState::present("directory")),
            FileEnsure::Link => Ok(ResourceState::present(format!(
                "-> {}",
                self.target()?.display()
            ))),
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(dry_run_skip());
        }

        match self.ensure {
            FileEnsure::Present => self.apply_file(ctx),
            FileEnsure::Directory => self.apply_directory(ctx),
            FileEnsure::Link => self.apply_symlink(ctx),
            FileEnsure::Absent => self.apply_absent(ctx),
        }
    }

    fn detail(&self, ctx: &ApplyContext) -> Option<String> {
        if self.ensure != FileEnsure::Present {
            return None;
        }
        let desired = self.resolve_content(ctx).ok().flatten()?;
        let current = ctx.fs().read(&self.path).ok().flatten().unwrap_or_default();
        let (Ok(old), Ok(new)) = (std::str::from_utf8(&current), std::str::from_utf8(&desired))
        else {
            return None;
        };

        let path = self.path.display().to_string();
        let diff = similar::TextDiff::from_lines(old, new)
            .unified_diff()
            .context_radius(3)
            .header(&path, &path)
            .to_string();
        (!diff.is_empty()).then_some(diff)
    }
}
