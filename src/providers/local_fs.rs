//! Filesystem provider over the real filesystem

use anyhow::{Context, Result};
use declarative::FilesystemProvider;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct LocalFs;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

impl FilesystemProvider for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        ensure_parent(path)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))
    }

    fn remove(&self, path: &Path, recursive: bool) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        };

        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)
            } else {
                fs::remove_dir(path)
            }
        } else {
            fs::remove_file(path)
        };
        result.with_context(|| format!("Failed to remove {}", path.display()))
    }

    fn symlink(&self, path: &Path, target: &Path) -> Result<()> {
        if fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
            fs::remove_file(path)
                .with_context(|| format!("Failed to replace link {}", path.display()))?;
        }
        ensure_parent(path)?;
        std::os::unix::fs::symlink(target, path).with_context(|| {
            format!("Failed to link {} -> {}", path.display(), target.display())
        })
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => fs::read_link(path)
                .map(Some)
                .with_context(|| format!("Failed to read link {}", path.display())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(root) {
                    files.push(rel.to_path_buf());
                }
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_reads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("easy-rsa/keys/ca.key");

        assert_eq!(LocalFs.read(&path).unwrap(), None);
        LocalFs.write(&path, b"key").unwrap();
        assert_eq!(LocalFs.read(&path).unwrap().as_deref(), Some(&b"key"[..]));
        assert!(LocalFs.exists(&path));
        assert!(LocalFs.is_dir(&tmp.path().join("easy-rsa")));
        assert_eq!(
            LocalFs.digest(&path).unwrap(),
            Some(blake3::hash(b"key").to_hex().to_string())
        );
    }

    #[test]
    fn test_symlink_replace_and_dangling() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("openssl.cnf");

        LocalFs.symlink(&link, Path::new("openssl-0.9.8.cnf")).unwrap();
        assert!(LocalFs.exists(&link));
        LocalFs.symlink(&link, Path::new("openssl-1.0.0.cnf")).unwrap();
        assert_eq!(
            LocalFs.read_link(&link).unwrap(),
            Some(PathBuf::from("openssl-1.0.0.cnf"))
        );

        let file = tmp.path().join("plain");
        fs::write(&file, "x").unwrap();
        assert_eq!(LocalFs.read_link(&file).unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("download");
        LocalFs.write(&dir.join("client.ovpn"), b"x").unwrap();

        assert!(LocalFs.remove(&dir, false).is_err());
        LocalFs.remove(&dir, true).unwrap();
        assert!(!LocalFs.exists(&dir));
        LocalFs.remove(&dir, true).unwrap();
    }

    #[test]
    fn test_walk_lists_files_sorted() {
        let tmp = TempDir::new().unwrap();
        for rel in ["b.conf", "ccd/client1", "a.conf"] {
            LocalFs.write(&tmp.path().join(rel), b"").unwrap();
        }
        fs::create_dir(tmp.path().join("empty")).unwrap();

        assert_eq!(
            LocalFs.walk(tmp.path()).unwrap(),
            [
                PathBuf::from("a.conf"),
                PathBuf::from("b.conf"),
                PathBuf::from("ccd/client1")
            ]
        );
    }
}
