//! In-memory host used by unit tests

use crate::context::{
    CommandRunner, FilesystemProvider, PackageProvider, PackageStatus, PackageVersion,
    ServiceProvider, ServiceStatus,
};
use crate::types::ServiceEnsure;
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    Dir,
    Link(PathBuf),
}

/// Package manager, init system, filesystem and shell in one struct
#[derive(Default)]
pub struct MemoryHost {
    entries: Mutex<BTreeMap<PathBuf, Entry>>,
    packages: Mutex<BTreeMap<String, PackageStatus>>,
    services: Mutex<BTreeMap<String, ServiceStatus>>,
    restarts: Mutex<usize>,
    /// Command substring -> guard path the command creates when it runs
    creates: Mutex<Vec<(String, PathBuf)>>,
    /// Commands containing any of these substrings exit 1
    failing: Mutex<Vec<String>>,
    /// Every command line run, in order
    pub runs: Mutex<Vec<String>>,
    /// Every provider mutation, in order
    pub log: Mutex<Vec<String>>,
}

impl MemoryHost {
    pub fn put_file(&self, path: impl Into<PathBuf>, content: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(path.into(), Entry::File(content.as_bytes().to_vec()));
    }

    pub fn put_link(&self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.entries
            .lock()
            .unwrap()
            .insert(path.into(), Entry::Link(target.into()));
    }

    pub fn file(&self, path: &str) -> Option<String> {
        match self.entries.lock().unwrap().get(Path::new(path)) {
            Some(Entry::File(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn set_package(&self, name: &str, status: PackageStatus) {
        self.packages.lock().unwrap().insert(name.to_string(), status);
    }

    pub fn package_status(&self, name: &str) -> PackageStatus {
        self.packages
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(PackageStatus::NotInstalled)
    }

    pub fn set_service(&self, name: &str, running: bool, enabled: bool) {
        self.services
            .lock()
            .unwrap()
            .insert(name.to_string(), ServiceStatus { running, enabled });
    }

    pub fn service_status(&self, name: &str) -> ServiceStatus {
        self.services
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(ServiceStatus {
                running: false,
                enabled: false,
            })
    }

    pub fn restarts(&self) -> usize {
        *self.restarts.lock().unwrap()
    }

    /// Running a command containing `needle` creates `guard`
    pub fn on_command(&self, needle: &str, guard: impl Into<PathBuf>) {
        self.creates
            .lock()
            .unwrap()
            .push((needle.to_string(), guard.into()));
    }

    /// Commands containing `needle` exit non-zero
    pub fn fail_command(&self, needle: &str) {
        self.failing.lock().unwrap().push(needle.to_string());
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn has_children(entries: &BTreeMap<PathBuf, Entry>, path: &Path) -> bool {
        entries.keys().any(|k| k != path && k.starts_with(path))
    }

    fn resolve(path: &Path, target: &Path) -> PathBuf {
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            path.parent().unwrap_or(Path::new("/")).join(target)
        }
    }
}

impl PackageProvider for MemoryHost {
    fn status(&self, name: &str) -> Result<PackageStatus> {
        Ok(self.package_status(name))
    }

    fn install(&self, name: &str, _version: PackageVersion) -> Result<()> {
        self.record(format!("install {name}"));
        self.set_package(name, PackageStatus::Installed { outdated: false });
        Ok(())
    }

    fn remove(&self, name: &str, purge_config: bool) -> Result<()> {
        self.record(format!("remove {name}"));
        let status = if purge_config {
            PackageStatus::NotInstalled
        } else {
            PackageStatus::ConfigOnly
        };
        self.set_package(name, status);
        Ok(())
    }
}

impl ServiceProvider for MemoryHost {
    fn status(&self, name: &str) -> Result<ServiceStatus> {
        Ok(self.service_status(name))
    }

    fn set_state(&self, name: &str, ensure: ServiceEnsure, enable: bool) -> Result<()> {
        self.record(format!("service {name} {ensure}"));
        self.set_service(name, ensure == ServiceEnsure::Running, enable);
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.record(format!("restart {name}"));
        *self.restarts.lock().unwrap() += 1;
        Ok(())
    }
}

impl FilesystemProvider for MemoryHost {
    fn exists(&self, path: &Path) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.contains_key(path) || Self::has_children(&entries, path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(Entry::Dir) => true,
            Some(Entry::File(_)) => false,
            Some(Entry::Link(target)) => {
                let target = Self::resolve(path, target);
                matches!(entries.get(&target), Some(Entry::Dir))
                    || Self::has_children(&entries, &target)
            }
            None => Self::has_children(&entries, path),
        }
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap();
        let path = match entries.get(path) {
            Some(Entry::Link(target)) => Self::resolve(path, target),
            _ => path.to_path_buf(),
        };
        match entries.get(&path) {
            Some(Entry::File(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => bail!("{} is a directory", path.display()),
            None if Self::has_children(&entries, &path) => {
                bail!("{} is a directory", path.display())
            }
            None => Ok(None),
        }
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.record(format!("write {}", path.display()));
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Entry::File(content.to_vec()));
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.record(format!("mkdir {}", path.display()));
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Entry::Dir);
        Ok(())
    }

    fn remove(&self, path: &Path, recursive: bool) -> Result<()> {
        self.record(format!("rm {}", path.display()));
        let mut entries = self.entries.lock().unwrap();
        if matches!(entries.get(path), Some(Entry::Link(_))) {
            entries.remove(path);
            return Ok(());
        }
        if Self::has_children(&entries, path) && !recursive {
            bail!("{} is not empty", path.display());
        }
        entries.retain(|k, _| !k.starts_with(path));
        Ok(())
    }

    fn symlink(&self, path: &Path, target: &Path) -> Result<()> {
        self.record(format!("ln {} {}", path.display(), target.display()));
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Entry::Link(target.to_path_buf()));
        Ok(())
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>> {
        match self.entries.lock().unwrap().get(path) {
            Some(Entry::Link(target)) => Ok(Some(target.clone())),
            _ => Ok(None),
        }
    }

    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|(k, e)| k.as_path() != root && matches!(e, Entry::File(_)))
            .filter_map(|(k, _)| k.strip_prefix(root).ok().map(Path::to_path_buf))
            .collect())
    }
}

impl CommandRunner for MemoryHost {
    fn run(&self, argv: &[String], _cwd: Option<&Path>) -> Result<i32> {
        let line = argv.last().cloned().unwrap_or_default();
        self.runs.lock().unwrap().push(line.clone());
        self.record(format!("run {line}"));

        if self.failing.lock().unwrap().iter().any(|n| line.contains(n)) {
            return Ok(1);
        }
        let guard = self
            .creates
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| line.contains(needle))
            .map(|(_, guard)| guard.clone());
        if let Some(guard) = guard {
            self.entries
                .lock()
                .unwrap()
                .insert(guard, Entry::File(Vec::new()));
        }
        Ok(0)
    }
}
